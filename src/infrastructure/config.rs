//! Configuration management
//!
//! Everything site-specific lives here: the platform table, the store layout,
//! the branch policy and the local workspace. Defaults reproduce the Julia
//! nightly build setup, so an empty file is a valid configuration.

use crate::pipeline::{
    Pipeline, PipelineError, PlatformEntry, PlatformMatrix, PublishPolicy, ReleaseLayout, Validate,
    ValidationError, default_platforms, package_pipeline,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Repository built when a trigger does not name one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Repository URL
    pub repository: String,
    /// Branch
    pub branch: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            repository: "git://github.com/JuliaLang/julia.git".to_string(),
            branch: "master".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,
    /// Default source
    pub source: SourceConfig,
    /// Store naming and staging
    pub layout: ReleaseLayout,
    /// Branch publishing rules
    pub publish: PublishPolicy,
    /// Limit for compile, test and packaging steps, in seconds
    pub long_step_timeout_secs: u64,
    /// Pause between attempts of a retried step, in seconds
    pub retry_delay_secs: u64,
    /// Directory holding one workspace per platform for local agents
    pub workspace_root: PathBuf,
    /// Variables removed from the environment of agent commands
    pub unset_env: Vec<String>,
    /// Variables set for agent commands, such as `LLVM_CMAKE`
    pub set_env: BTreeMap<String, String>,
    /// Platform table
    pub platforms: Vec<PlatformEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            source: SourceConfig::default(),
            layout: ReleaseLayout::default(),
            publish: PublishPolicy::default(),
            long_step_timeout_secs: 3600,
            retry_delay_secs: 5,
            workspace_root: PathBuf::from(".binarydist/agents"),
            unset_env: vec!["CFLAGS".to_string(), "CPPFLAGS".to_string()],
            set_env: BTreeMap::new(),
            platforms: default_platforms(),
        }
    }
}

impl Config {
    /// Loads and validates a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the file cannot be read or parsed
    /// and [`PipelineError::Validation`] if it is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    /// Parses and validates YAML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for malformed YAML and
    /// [`PipelineError::Validation`] for invalid values.
    pub fn from_yaml_str(text: &str) -> Result<Self, PipelineError> {
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Serializes to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, PipelineError> {
        serde_yaml::to_string(self).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Builds the platform matrix.
    ///
    /// # Errors
    ///
    /// See [`PlatformMatrix::from_entries`].
    pub fn matrix(&self) -> Result<PlatformMatrix, PipelineError> {
        PlatformMatrix::from_entries(&self.platforms)
    }

    /// Builds the packaging pipeline for this layout
    #[must_use]
    pub fn pipeline(&self) -> Pipeline {
        package_pipeline(&self.layout, self.long_step_timeout())
    }

    /// Limit for long steps
    #[must_use]
    pub fn long_step_timeout(&self) -> Duration {
        Duration::from_secs(self.long_step_timeout_secs)
    }

    /// Pause between attempts
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Validate for Config {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.long_step_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout { value: 0 });
        }
        if self.source.repository.is_empty() {
            return Err(ValidationError::EmptyValue("source.repository"));
        }
        if self.source.branch.is_empty() {
            return Err(ValidationError::EmptyValue("source.branch"));
        }
        if self.layout.product.is_empty() {
            return Err(ValidationError::EmptyValue("layout.product"));
        }
        if self.layout.store_root.is_empty() {
            return Err(ValidationError::EmptyValue("layout.store_root"));
        }
        if self.platforms.is_empty() {
            return Err(ValidationError::EmptyMatrix);
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.platforms {
            entry.validate()?;
            if !seen.insert(entry.key.as_str()) {
                return Err(ValidationError::DuplicatePlatform(entry.key.clone()));
            }
        }
        Ok(())
    }
}
