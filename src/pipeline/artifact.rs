//! Artifact identity
//!
//! The typed view of everything that names a built distributable. It is
//! resolved from the property store in one go so that every renderer sees
//! either a complete identity or a [`PipelineError::MissingProperty`].

use super::errors::PipelineError;
use super::properties::{PropertyStore, keys};
use serde::{Deserialize, Serialize};

/// Identity of one built distributable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactIdentity {
    /// OS directory name in the store (`mac`, `winnt`, `linux`)
    pub os_name: String,
    /// Architecture label
    pub arch: String,
    /// `major.minor`
    pub majmin: String,
    /// Full version
    pub version: String,
    /// Abbreviated commit hash
    pub shortcommit: String,
    /// Filename, extension included
    pub filename: String,
}

impl ArtifactIdentity {
    /// Resolves the identity from the run's properties.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingProperty`] naming the first required
    /// property that has not been written.
    pub fn resolve(store: &PropertyStore) -> Result<Self, PipelineError> {
        Ok(Self {
            os_name: store.get_text(keys::OS_NAME)?.to_string(),
            arch: store.get_text(keys::UP_ARCH)?.to_string(),
            majmin: store.get_text(keys::MAJMIN)?.to_string(),
            version: store.get_text(keys::VERSION)?.to_string(),
            shortcommit: store.get_text(keys::SHORTCOMMIT)?.to_string(),
            filename: store.get_text(keys::ARTIFACT_FILENAME)?.to_string(),
        })
    }
}

/// Where an artifact lands in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDestination {
    /// Versioned store path
    pub path: String,
    /// "latest" alias path
    pub latest_path: String,
}

impl UploadDestination {
    /// Path a publish step writes to
    #[must_use]
    pub fn target(&self, latest: bool) -> &str {
        if latest { &self.latest_path } else { &self.path }
    }
}
