//! Prelude module for common imports

pub use crate::pipeline::{
    ArtifactIdentity, CommandRenderer, Extractor, OsClass, Pipeline, PipelineBuilder,
    PipelineError, Platform, PlatformEntry, PlatformMatrix, PropertyStore, PropertyValue,
    PublishGate, PublishPolicy, ReleaseLayout, RunStatus, Step, StepCondition, StepOutcome,
    StepResult, Validate, ValidationError, keys,
};

pub use crate::executor::{
    AgentProvider, AgentSession, ArtifactTransfer, CommandOutput, CommandRunner, Collaborators,
    DownstreamTrigger, LocalExecutor, Orchestrator, RunReport, StopHandle, StopSignal,
    TriggerInput, TriggerPayload,
};

pub use crate::infrastructure::{Config, init_logging};
