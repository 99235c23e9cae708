//! Platform matrix
//!
//! Maps a platform key (the name a packaging job is triggered under) to the
//! build agent that runs it, its OS class, architecture label and build
//! flags. The table is configuration driven; nothing else in the crate
//! branches on platform names.

use super::Validate;
use super::errors::{PipelineError, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Operating system family of a build agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsClass {
    /// macOS
    Osx,
    /// Windows
    Windows,
    /// Linux (and anything not recognized as the other two)
    Linux,
}

impl OsClass {
    /// Classifies an agent or platform name by substring.
    ///
    /// `osx` wins over `win`, and everything else is Linux.
    #[must_use]
    pub fn classify(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.contains("osx") {
            Self::Osx
        } else if name.contains("win") {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    /// Extension of the distributable produced on this OS
    #[must_use]
    pub fn artifact_extension(self) -> &'static str {
        match self {
            Self::Osx => ".dmg",
            Self::Windows => ".exe",
            Self::Linux => ".tar.gz",
        }
    }

    /// Directory name used for this OS in the artifact store
    #[must_use]
    pub fn store_name(self) -> &'static str {
        match self {
            Self::Osx => "mac",
            Self::Windows => "winnt",
            Self::Linux => "linux",
        }
    }
}

impl FromStr for OsClass {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "osx" | "mac" | "macos" => Ok(Self::Osx),
            "windows" | "win" | "winnt" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            _ => Err(PipelineError::UnknownOsClass(s.to_string())),
        }
    }
}

impl fmt::Display for OsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Osx => write!(f, "osx"),
            Self::Windows => write!(f, "windows"),
            Self::Linux => write!(f, "linux"),
        }
    }
}

/// One row of the platform table as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEntry {
    /// Platform key, e.g. `package_linux64`
    pub key: String,

    /// Build agent that runs this platform
    pub agent: String,

    /// Architecture label used in store paths (`x64`, `x86`, `armv7l`, ...)
    pub arch: String,

    /// Extra arguments passed to every `make` invocation
    #[serde(default)]
    pub flags: String,

    /// Whether artifacts built here may be published
    #[serde(default = "default_publish")]
    pub publish: bool,

    /// Explicit OS class; derived from the agent name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

fn default_publish() -> bool {
    true
}

impl PlatformEntry {
    /// Creates a publish-eligible entry with no flags
    pub fn new(key: impl Into<String>, agent: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            agent: agent.into(),
            arch: arch.into(),
            flags: String::new(),
            publish: true,
            os: None,
        }
    }

    /// Sets the build flags
    #[must_use]
    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        self.flags = flags.into();
        self
    }

    /// Marks the entry as build-only
    #[must_use]
    pub fn build_only(mut self) -> Self {
        self.publish = false;
        self
    }
}

impl Validate for PlatformEntry {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.key.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.key.len() > 100 {
            return Err(ValidationError::NameTooLong {
                max: 100,
                len: self.key.len(),
            });
        }
        if !self
            .key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ValidationError::InvalidNameChars {
                name: self.key.clone(),
            });
        }
        if self.agent.is_empty() {
            return Err(ValidationError::EmptyValue("agent"));
        }
        if self.arch.is_empty() {
            return Err(ValidationError::EmptyValue("arch"));
        }
        Ok(())
    }
}

/// A resolved platform: what a run needs to know about where it builds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Platform key
    pub key: String,
    /// Build agent name
    pub agent: String,
    /// OS class
    pub os: OsClass,
    /// Architecture label
    pub arch: String,
    /// Build flags
    pub flags: String,
    /// Whether artifacts may be published
    pub publish_eligible: bool,
}

impl Platform {
    fn from_entry(entry: &PlatformEntry) -> Result<Self, PipelineError> {
        let os = match &entry.os {
            Some(name) => name.parse()?,
            None => OsClass::classify(&entry.agent),
        };
        Ok(Self {
            key: entry.key.clone(),
            agent: entry.agent.clone(),
            os,
            arch: entry.arch.clone(),
            flags: entry.flags.clone(),
            publish_eligible: entry.publish,
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {} on {})", self.key, self.os, self.arch, self.agent)
    }
}

/// Read-only table of every platform a pipeline can run for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformMatrix {
    platforms: Vec<Platform>,
}

impl PlatformMatrix {
    /// Builds the matrix from configuration rows.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty table, a malformed row or a
    /// duplicate key, and [`PipelineError::UnknownOsClass`] for an explicit
    /// OS name that is not recognized.
    pub fn from_entries(entries: &[PlatformEntry]) -> Result<Self, PipelineError> {
        if entries.is_empty() {
            return Err(ValidationError::EmptyMatrix.into());
        }

        let mut seen = HashSet::new();
        let mut platforms = Vec::with_capacity(entries.len());
        for entry in entries {
            entry.validate()?;
            if !seen.insert(entry.key.as_str()) {
                return Err(ValidationError::DuplicatePlatform(entry.key.clone()).into());
            }
            platforms.push(Platform::from_entry(entry)?);
        }

        Ok(Self { platforms })
    }

    /// Looks up a platform by key.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownPlatform`] if the key is not in the table.
    pub fn lookup(&self, key: &str) -> Result<&Platform, PipelineError> {
        self.platforms
            .iter()
            .find(|p| p.key == key)
            .ok_or_else(|| PipelineError::UnknownPlatform(key.to_string()))
    }

    /// Iterates platforms in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Platform> {
        self.platforms.iter()
    }

    /// Platform keys in declaration order
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.platforms.iter().map(|p| p.key.as_str()).collect()
    }

    /// Number of platforms
    #[must_use]
    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    /// Returns true if the table is empty (never the case once built)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

/// The built-in platform table: the packaging builders plus the build-only
/// distribution checks that never upload.
#[must_use]
pub fn default_platforms() -> Vec<PlatformEntry> {
    vec![
        PlatformEntry::new("package_osx64", "osx10_10-x64", "x64"),
        PlatformEntry::new("package_win32", "win6_2-x86", "x86").with_flags("ARCH=i686"),
        PlatformEntry::new("package_win64", "win6_2-x64", "x64").with_flags("ARCH=x86_64"),
        PlatformEntry::new("package_linux32", "centos5_11-x86", "x86")
            .with_flags("ARCH=i686 MARCH=pentium4"),
        PlatformEntry::new("package_linux64", "centos5_11-x64", "x64")
            .with_flags("ARCH=x86_64 MARCH=x86-64"),
        PlatformEntry::new("package_linuxarmv7l", "debian7_11-armv7l", "armv7l")
            .with_flags("MARCH=armv7-a"),
        PlatformEntry::new("package_linuxppc64le", "centos7_2-ppc64le", "ppc64le"),
        PlatformEntry::new("package_linuxaarch64", "centos7_2-aarch64", "aarch64"),
        PlatformEntry::new("build_ubuntu32", "ubuntu14_04-x86", "x86").build_only(),
        PlatformEntry::new("build_ubuntu64", "ubuntu14_04-x64", "x64").build_only(),
        PlatformEntry::new("build_centos64", "centos7_1-x64", "x64").build_only(),
    ]
}
