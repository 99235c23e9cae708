//! Pipeline domain types and logic
//!
//! Everything here is pure: platform tables, the property store, output
//! parsers, renderers and publish decisions. Execution lives in
//! [`crate::executor`].

pub mod artifact;
pub mod errors;
pub mod extract;
pub mod package;
pub mod pipeline_def;
pub mod platform;
pub mod properties;
pub mod publish;
pub mod render;
pub mod steps;
pub mod types;

#[cfg(test)]
mod types_tests;

pub use artifact::{ArtifactIdentity, UploadDestination};
pub use errors::{PipelineError, ValidationError};
pub use extract::{CommitMetadata, Extractor, VersionInfo};
pub use package::{LONG_STEP_TIMEOUT, package_pipeline};
pub use pipeline_def::{Pipeline, PipelineBuilder};
pub use platform::{OsClass, Platform, PlatformEntry, PlatformMatrix, default_platforms};
pub use properties::{PropertyStore, PropertyUpdate, PropertyValue, keys};
pub use publish::{PublishGate, PublishPolicy};
pub use render::{CommandRenderer, ReleaseLayout, RenderContext, UploadCommand};
pub use steps::{CommandSpec, Location, Step, StepAction, StepCondition};
pub use types::{RunStatus, StepOutcome, StepResult, Validate};
