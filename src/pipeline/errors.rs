//! Error types for pipeline domain

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building or running a packaging pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Validation failed with specified reason
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Platform key is not present in the platform matrix
    #[error("Unknown platform: '{0}'")]
    UnknownPlatform(String),

    /// Operating system name could not be classified
    #[error("Unknown OS class: '{0}'")]
    UnknownOsClass(String),

    /// Step output does not have the shape an extractor expects
    #[error("Malformed output for {extractor}: {reason}")]
    MalformedOutput {
        /// Name of the extractor that rejected the output.
        extractor: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A property was read before any step wrote it
    #[error("Missing property: '{0}'")]
    MissingProperty(String),

    /// A property exists but holds the wrong kind of value
    #[error("Property '{name}' is not a {expected}")]
    PropertyType {
        /// Property name.
        name: String,
        /// Expected kind ("text" or "record").
        expected: &'static str,
    },

    /// Write attempted after the run reached a terminal state
    #[error("Property store is frozen, cannot write '{0}'")]
    PropertiesFrozen(String),

    /// Artifact filename cannot be rewritten into its "latest" alias
    #[error("Invalid artifact filename '{filename}': {reason}")]
    InvalidArtifactFilename {
        /// Offending filename.
        filename: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Step exceeded its wall-clock timeout
    #[error("Timeout after {duration:?}")]
    StepTimeout {
        /// Duration before timeout.
        duration: Duration,
    },

    /// Command execution failed
    #[error("Command failed with exit code {code}: {stderr}")]
    CommandFailed {
        /// Exit code returned by the command.
        code: i32,
        /// Standard error output from the command.
        stderr: String,
    },

    /// Moving the artifact from the agent to the controller failed
    #[error("Transfer of '{filename}' failed: {reason}")]
    TransferFailure {
        /// Artifact filename.
        filename: String,
        /// Underlying cause.
        reason: String,
    },

    /// Upload to the artifact store failed after every attempt
    #[error("Publish to '{destination}' failed after {attempts} attempts: {reason}")]
    PublishFailure {
        /// Store path the upload targeted.
        destination: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last failure.
        reason: String,
    },

    /// Run was stopped by an external request
    #[error("Run cancelled")]
    Cancelled,

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl PipelineError {
    /// Builds a [`PipelineError::MalformedOutput`]
    pub fn malformed(extractor: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            extractor,
            reason: reason.into(),
        }
    }
}

/// Validation errors for configuration and pipeline definitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Name cannot be empty
    #[error("Name cannot be empty")]
    EmptyName,

    /// Name too long
    #[error("Name too long: max {max} characters, got {len}")]
    NameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length of the name.
        len: usize,
    },

    /// Invalid characters in name
    #[error("Invalid characters in name: '{name}'")]
    InvalidNameChars {
        /// The invalid name.
        name: String,
    },

    /// Platform key declared more than once
    #[error("Duplicate platform key: '{0}'")]
    DuplicatePlatform(String),

    /// Platform matrix is empty
    #[error("Platform matrix must declare at least one platform")]
    EmptyMatrix,

    /// Pipeline has no steps
    #[error("Pipeline must have at least one step")]
    EmptyPipeline,

    /// Invalid timeout value
    #[error("Invalid timeout: must be positive, got {value}")]
    InvalidTimeout {
        /// The invalid timeout value.
        value: u64,
    },

    /// Invalid retry count
    #[error("Invalid attempt count: must be positive, got {value}")]
    InvalidAttempts {
        /// The invalid attempt count.
        value: u32,
    },

    /// A required configuration value is empty
    #[error("Configuration value '{0}' cannot be empty")]
    EmptyValue(&'static str),
}
