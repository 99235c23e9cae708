//! Tests for pipeline types
//!
//! Status, outcome and error types shared across the crate.

use super::*;
use std::time::Duration;

#[test]
fn test_run_status_predicates() {
    assert!(RunStatus::Succeeded.is_success());
    assert!(RunStatus::Succeeded.is_terminal());
    assert!(RunStatus::FailedHalted.is_halted());
    assert!(RunStatus::FailedContinued.is_terminal());
    assert!(!RunStatus::FailedContinued.is_success());
    assert!(!RunStatus::Running.is_terminal());
    assert!(!RunStatus::Pending.is_terminal());
}

#[test]
fn test_run_status_display() {
    assert_eq!(RunStatus::Succeeded.to_string(), "SUCCEEDED");
    assert_eq!(RunStatus::FailedHalted.to_string(), "FAILED (halted)");
    assert_eq!(
        RunStatus::FailedContinued.to_string(),
        "FAILED (continued with warnings)"
    );
}

#[test]
fn test_run_status_serialize() {
    let json = serde_json::to_string(&RunStatus::FailedContinued).unwrap();
    assert_eq!(json, r#""failed-continued""#);
    let status: RunStatus = serde_json::from_str(r#""failed-halted""#).unwrap();
    assert_eq!(status, RunStatus::FailedHalted);
}

#[test]
fn test_step_result_predicates() {
    assert!(StepResult::Success.is_success());
    assert!(StepResult::Failure.is_failure());
    assert!(StepResult::Skipped.is_skipped());
    assert!(!StepResult::Skipped.is_failure());
    assert_eq!(StepResult::Skipped.to_string(), "SKIPPED");
}

#[test]
fn test_step_outcome_serializes_millis() {
    let outcome = StepOutcome {
        name: "make".into(),
        result: StepResult::Failure,
        halted: true,
        duration: Duration::from_millis(1500),
        error: Some("Command failed with exit code 2: boom".into()),
    };
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["duration"], 1500);
    assert_eq!(json["result"], "failure");
    assert_eq!(
        outcome.to_string(),
        "[FAILURE] make: Command failed with exit code 2: boom"
    );

    let back: StepOutcome = serde_json::from_value(json).unwrap();
    assert_eq!(back, outcome);
}

#[test]
fn test_validation_error_messages() {
    let err = ValidationError::NameTooLong { max: 100, len: 150 };
    assert!(err.to_string().contains("too long"));
    assert!(err.to_string().contains("150"));
    assert!(ValidationError::EmptyName.to_string().contains("empty"));
    assert_eq!(
        ValidationError::DuplicatePlatform("package_linux64".into()).to_string(),
        "Duplicate platform key: 'package_linux64'"
    );
}

#[test]
fn test_pipeline_error_from_validation() {
    let err: PipelineError = ValidationError::EmptyMatrix.into();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(err.to_string().starts_with("Validation failed"));
}

#[test]
fn test_pipeline_error_from_io() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    assert_eq!(PipelineError::from(io), PipelineError::Io("gone".into()));
}
