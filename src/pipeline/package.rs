//! The binary packaging pipeline
//!
//! One fixed step list shared by every platform. Platform differences are
//! expressed through step predicates and the `${flags}` property, never by
//! building a different list.

use super::extract::Extractor;
use super::pipeline_def::Pipeline;
use super::platform::OsClass;
use super::render::{CommandRenderer, ReleaseLayout, UPLOAD_ATTEMPTS};
use super::steps::{Step, StepAction, StepCondition};
use std::time::Duration;

/// Default limit for compile, test and packaging steps
pub const LONG_STEP_TIMEOUT: Duration = Duration::from_secs(3600);

/// Step names, as they appear in run reports
pub mod names {
    /// Best-effort refresh of an existing clone
    pub const FETCH: &str = "git fetch";
    /// Clean checkout
    pub const CHECKOUT: &str = "checkout";
    /// Homebrew toolchain on macOS
    pub const BREW: &str = "Install necessary brew dependencies";
    /// Clean build state
    pub const CLEAN: &str = "make cleanall";
    /// Compile
    pub const MAKE: &str = "make";
    /// Test
    pub const TEST: &str = "make testall";
    /// Windows extras
    pub const WIN_EXTRAS: &str = "make win-extras";
    /// Package
    pub const BINARY_DIST: &str = "make binary-dist";
    /// Version and short commit
    pub const VERSION: &str = "Get version/shortcommit";
    /// Commit metadata
    pub const COMMIT: &str = "Get commitmessage";
    /// Artifact filename
    pub const FILENAME: &str = "Get build artifact filename";
    /// Controller staging directory
    pub const STAGING: &str = "mkdir staging";
    /// Agent to controller copy
    pub const TRANSFER: &str = "Transfer artifact";
    /// Versioned upload
    pub const UPLOAD: &str = "Upload to store";
    /// Latest alias upload
    pub const UPLOAD_LATEST: &str = "Upload to store (latest)";
    /// Staged copy removal
    pub const CLEANUP: &str = "Cleanup staging";
    /// Downstream notification
    pub const TRIGGER: &str = "Trigger downstream verification";
}

/// Builds the packaging pipeline.
///
/// `long_timeout` bounds the compile, test and packaging steps.
#[must_use]
pub fn package_pipeline(layout: &ReleaseLayout, long_timeout: Duration) -> Pipeline {
    let staging = layout.staging_root.to_string_lossy().into_owned();

    Pipeline::builder(format!("{} binary packaging", layout.product))
        .steps([
            // no existing clone is fine here
            Step::command(names::FETCH, ["git", "fetch"]),
            Step::rendered(names::CHECKOUT, CommandRenderer::Checkout).halt_on_failure(),
            Step::command(names::BREW, ["brew", "install", "gcc", "cmake"])
                .when(StepCondition::Os(OsClass::Osx)),
            Step::shell(names::CLEAN, "make ${flags} cleanall"),
            Step::shell(names::MAKE, "make -j3 ${flags} debug release")
                .halt_on_failure()
                .with_timeout(long_timeout),
            Step::shell(names::TEST, "make ${flags} testall")
                .halt_on_failure()
                .with_timeout(long_timeout),
            Step::shell(names::WIN_EXTRAS, "make ${flags} win-extras")
                .halt_on_failure()
                .when(StepCondition::Os(OsClass::Windows)),
            Step::shell(names::BINARY_DIST, "make ${flags} binary-dist")
                .halt_on_failure()
                .with_timeout(long_timeout),
            Step::rendered(names::VERSION, CommandRenderer::VersionQuery)
                .extract(Extractor::Version)
                .halt_on_failure(),
            Step::command(
                names::COMMIT,
                ["git", "log", "-1", "--pretty=format:%s%n%cN%n%cE%n%aN%n%aE"],
            )
            .extract(Extractor::CommitMetadata),
            Step::command(names::FILENAME, ["make", "print-JULIA_BINARYDIST_FILENAME"])
                .extract(Extractor::ArtifactFilename)
                .halt_on_failure(),
            Step::command(names::STAGING, ["mkdir".to_string(), "-p".to_string(), staging])
                .on_controller(),
            Step::new(names::TRANSFER, StepAction::Transfer).halt_on_failure(),
            Step::new(names::UPLOAD, StepAction::Publish { latest: false })
                .when(StepCondition::ShouldUpload)
                .with_attempts(UPLOAD_ATTEMPTS)
                .halt_on_failure(),
            Step::new(names::UPLOAD_LATEST, StepAction::Publish { latest: true })
                .when(StepCondition::ShouldUploadLatest)
                .with_attempts(UPLOAD_ATTEMPTS)
                .halt_on_failure(),
            Step::rendered(names::CLEANUP, CommandRenderer::CleanupStaging)
                .on_controller()
                .when(StepCondition::ShouldUpload),
            Step::new(names::TRIGGER, StepAction::TriggerDownstream)
                .when(StepCondition::ShouldTriggerDownstream),
        ])
        .build_unchecked()
}
