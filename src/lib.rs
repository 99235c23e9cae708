//! # binarydist - build and release pipeline for binary distributions
//!
//! Coordinates the compilation of a project's release artifacts across a
//! matrix of operating systems and architectures, and their conditional
//! publication to an artifact store.
//!
//! Every platform runs the same fixed sequence of steps: checkout, clean,
//! compile, test, package, extract version and commit metadata, transfer
//! the artifact to the controller, publish it and notify a downstream
//! verification pipeline. Platform differences are expressed only through
//! step predicates and per-platform build flags.
//!
//! ## Layout
//!
//! - [`pipeline`]: pure domain logic (platform matrix, property store,
//!   output extractors, renderers, publish decisions, the step list)
//! - [`executor`]: collaborator traits, local implementations, the step
//!   sequencer and the orchestrator
//! - [`infrastructure`]: configuration, logging and metrics
//!
//! ## Example
//!
//! ```no_run
//! use binarydist::prelude::*;
//!
//! # async fn demo() -> Result<(), PipelineError> {
//! let config = Config::default();
//! let orchestrator = Orchestrator::new(&config, Collaborators::local(&config))?;
//! let report = orchestrator
//!     .run(&TriggerInput::new("package_linux64"), StopSignal::never())
//!     .await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod executor;
pub mod infrastructure;
pub mod pipeline;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use executor::{
    AgentProvider, ArtifactTransfer, CommandRunner, DownstreamTrigger, LocalExecutor,
    Orchestrator, PipelineRun, RunReport, StepSequencer, StopSignal, TriggerInput,
};
pub use infrastructure::{Config, MetricsCollector};
pub use pipeline::{
    Pipeline, PipelineError, Platform, PlatformMatrix, PropertyStore, PublishGate, RunStatus,
    Step, Validate,
};

/// Version of the binarydist crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
