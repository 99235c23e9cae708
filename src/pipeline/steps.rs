//! Step types for pipeline execution
//!
//! This module defines the steps a packaging run is made of, where they
//! execute and when they are skipped.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use super::Validate;
use super::errors::{PipelineError, ValidationError};
use super::extract::Extractor;
use super::platform::{OsClass, Platform};
use super::publish::PublishGate;
use super::render::{CommandRenderer, RenderContext};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Where a command runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// The platform's build agent
    Agent,
    /// The controller that owns the artifact store credentials
    Controller,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Controller => write!(f, "controller"),
        }
    }
}

/// How a step's argv is obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSpec {
    /// Fixed tokens; `${name}` references are filled from the property store
    Literal(Vec<String>),
    /// Computed by a renderer when the step starts
    Rendered(CommandRenderer),
}

impl CommandSpec {
    /// Produces the argv against the current run state.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingProperty`] for unset references and
    /// whatever the renderer reports.
    pub fn resolve(&self, ctx: &RenderContext<'_>) -> Result<Vec<String>, PipelineError> {
        match self {
            Self::Literal(tokens) => tokens.iter().map(|t| ctx.store.interpolate(t)).collect(),
            Self::Rendered(renderer) => renderer.render(ctx),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(tokens) => write!(f, "{}", shell_words::join(tokens)),
            Self::Rendered(renderer) => write!(f, "{renderer}"),
        }
    }
}

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// Run a command
    Command {
        /// Where to run it
        location: Location,
        /// The argv
        command: CommandSpec,
    },
    /// Copy the artifact from the agent to the controller staging directory
    Transfer,
    /// Upload the staged artifact to the store
    Publish {
        /// Target the "latest" alias instead of the versioned path
        latest: bool,
    },
    /// Notify the downstream verification consumer
    TriggerDownstream,
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command { location, command } => write!(f, "{location}: {command}"),
            Self::Transfer => write!(f, "transfer artifact"),
            Self::Publish { latest: false } => write!(f, "publish"),
            Self::Publish { latest: true } => write!(f, "publish latest"),
            Self::TriggerDownstream => write!(f, "trigger downstream"),
        }
    }
}

/// Predicate deciding whether a step runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCondition {
    /// Always run
    Always,
    /// Run only on agents of this OS class
    Os(OsClass),
    /// Run only if the artifact is uploaded
    ShouldUpload,
    /// Run only if the "latest" alias is refreshed
    ShouldUploadLatest,
    /// Run only if downstream verification is triggered
    ShouldTriggerDownstream,
    /// All conditions must be true
    AllOf(Vec<StepCondition>),
}

impl StepCondition {
    /// Evaluates the predicate for a platform and its publish gate
    pub fn evaluate(&self, platform: &Platform, gate: &PublishGate) -> bool {
        match self {
            Self::Always => true,
            Self::Os(os) => platform.os == *os,
            Self::ShouldUpload => gate.should_upload(platform),
            Self::ShouldUploadLatest => gate.should_upload_latest(platform),
            Self::ShouldTriggerDownstream => gate.should_trigger_downstream(platform),
            Self::AllOf(conditions) => conditions.iter().all(|c| c.evaluate(platform, gate)),
        }
    }
}

impl fmt::Display for StepCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::Os(os) => write!(f, "on {os}"),
            Self::ShouldUpload => write!(f, "if uploading"),
            Self::ShouldUploadLatest => write!(f, "if uploading latest"),
            Self::ShouldTriggerDownstream => write!(f, "if triggering downstream"),
            Self::AllOf(conditions) => {
                let parts: Vec<String> = conditions.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(" and "))
            }
        }
    }
}

/// A single step in a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Step name
    pub name: String,

    /// What the step does
    #[serde(flatten)]
    pub action: StepAction,

    /// When the step runs
    pub when: StepCondition,

    /// A failure stops the run
    pub halt_on_failure: bool,

    /// Wall-clock limit; `None` is unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Attempts before the step counts as failed
    pub attempts: u32,

    /// Parser for the step's output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extractor: Option<Extractor>,
}

impl Step {
    /// Creates a step that always runs, never halts and is tried once
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            action,
            when: StepCondition::Always,
            halt_on_failure: false,
            timeout: None,
            attempts: 1,
            extractor: None,
        }
    }

    /// Creates an agent command step from literal tokens
    pub fn command<I, S>(name: impl Into<String>, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            StepAction::Command {
                location: Location::Agent,
                command: CommandSpec::Literal(argv.into_iter().map(Into::into).collect()),
            },
        )
    }

    /// Creates an agent step running `script` through `/bin/bash -c`
    pub fn shell(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self::command(name, ["/bin/bash".to_string(), "-c".to_string(), script.into()])
    }

    /// Creates an agent command step whose argv is rendered at run time
    pub fn rendered(name: impl Into<String>, renderer: CommandRenderer) -> Self {
        Self::new(
            name,
            StepAction::Command {
                location: Location::Agent,
                command: CommandSpec::Rendered(renderer),
            },
        )
    }

    /// Moves a command step to the controller
    pub fn on_controller(mut self) -> Self {
        if let StepAction::Command { location, .. } = &mut self.action {
            *location = Location::Controller;
        }
        self
    }

    /// Makes a failure of this step stop the run
    pub fn halt_on_failure(mut self) -> Self {
        self.halt_on_failure = true;
        self
    }

    /// Sets the execution predicate
    pub fn when(mut self, condition: StepCondition) -> Self {
        self.when = condition;
        self
    }

    /// Sets the timeout for the step
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the number of attempts
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Attaches an output extractor
    pub fn extract(mut self, extractor: Extractor) -> Self {
        self.extractor = Some(extractor);
        self
    }
}

impl Validate for Step {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.name.len() > 100 {
            return Err(ValidationError::NameTooLong {
                max: 100,
                len: self.name.len(),
            });
        }
        if self.attempts == 0 {
            return Err(ValidationError::InvalidAttempts { value: 0 });
        }
        if let Some(timeout) = self.timeout
            && timeout.is_zero()
        {
            return Err(ValidationError::InvalidTimeout { value: 0 });
        }
        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step({}): {}", self.name, self.action)
    }
}
