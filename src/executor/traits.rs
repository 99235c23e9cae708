//! Execution boundaries
//!
//! Traits for the collaborators a run talks to: the build agent and the
//! controller that execute commands, the file transfer between them and the
//! downstream verification pipeline.

use crate::pipeline::{Platform, PipelineError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Captured result of one command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code (`-1` when killed by a signal)
    pub exit_code: i32,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Returns true if command succeeded (exit code 0)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs argv on some host
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Executes a command and captures its output.
    ///
    /// A non-zero exit code is reported through [`CommandOutput`], not as an
    /// error. Dropping the returned future must abort the command.
    ///
    /// # Errors
    ///
    /// Returns an error only when the command could not be started.
    async fn run(&self, argv: &[String]) -> Result<CommandOutput, PipelineError>;
}

/// Moves the built artifact from the agent to the controller
#[async_trait]
pub trait ArtifactTransfer: Send + Sync {
    /// Copies `filename` from the agent's working directory to `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy could not be completed.
    async fn transfer(&self, filename: &str, destination: &Path) -> Result<(), PipelineError>;
}

/// Metadata handed to the downstream verification pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPayload {
    /// Download URL of the published artifact
    pub url: String,
    /// Commit subject
    pub commitmessage: String,
    /// Committer name
    pub commitname: String,
    /// Committer email
    pub commitemail: String,
    /// Author name
    pub authorname: String,
    /// Author email
    pub authoremail: String,
    /// Abbreviated commit hash
    pub shortcommit: String,
}

/// Notifies downstream consumers without waiting for them
pub trait DownstreamTrigger: Send + Sync {
    /// Hands off the payload. Must not block on the consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer cannot be reached at all.
    fn dispatch(&self, consumer: &str, payload: TriggerPayload) -> Result<(), PipelineError>;
}

/// A connected build agent
#[derive(Clone)]
pub struct AgentSession {
    /// Command execution on the agent
    pub runner: Arc<dyn CommandRunner>,
    /// Artifact transfer from the agent
    pub transfer: Arc<dyn ArtifactTransfer>,
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession").finish_non_exhaustive()
    }
}

/// Hands out a session on the agent that builds a platform
#[async_trait]
pub trait AgentProvider: Send + Sync {
    /// Connects to the agent named by `platform`.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent is unavailable.
    async fn connect(&self, platform: &Platform) -> Result<AgentSession, PipelineError>;
}
