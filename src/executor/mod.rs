//! Pipeline execution layer
//!
//! This module contains the collaborator traits, their local
//! implementations and the machinery that drives runs through a pipeline.

mod local;
mod orchestrator;
mod run;
mod sequencer;
mod traits;
mod trigger;

pub use local::{ExecutorConfig, LocalAgents, LocalExecutor, LocalTransfer};
pub use orchestrator::{Collaborators, Orchestrator, PlannedStep, RunPlan};
pub use run::{PipelineRun, RunReport, StopHandle, StopSignal, TriggerInput};
pub use sequencer::{DEFAULT_RETRY_DELAY, StepSequencer};
pub use traits::{
    AgentProvider, AgentSession, ArtifactTransfer, CommandOutput, CommandRunner,
    DownstreamTrigger, TriggerPayload,
};
pub use trigger::{ChannelTrigger, LogTrigger, TriggerMessage};
