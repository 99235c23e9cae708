//! Orchestrator
//!
//! Turns trigger inputs into pipeline runs. Holds the shared, read-only parts
//! (platform matrix, pipeline, layout) behind `Arc`s; every run gets its own
//! store and is driven to completion by a [`StepSequencer`].

use super::local::{LocalAgents, LocalExecutor};
use super::run::{PipelineRun, RunReport, StopSignal, TriggerInput};
use super::sequencer::StepSequencer;
use super::traits::{AgentProvider, CommandRunner, DownstreamTrigger};
use super::trigger::LogTrigger;
use crate::infrastructure::{Config, MetricsCollector, RunMetrics, SourceConfig};
use crate::pipeline::{
    Pipeline, PipelineError, Platform, PlatformMatrix, PublishGate, PublishPolicy, Step, Validate,
};
use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// External systems a run talks to
#[derive(Clone)]
pub struct Collaborators {
    /// Build agents
    pub agents: Arc<dyn AgentProvider>,
    /// Command execution on the controller
    pub controller: Arc<dyn CommandRunner>,
    /// Downstream verification
    pub trigger: Arc<dyn DownstreamTrigger>,
}

impl Collaborators {
    /// Everything on this host: one workspace directory per platform,
    /// controller commands run locally and triggers are logged
    #[must_use]
    pub fn local(config: &Config) -> Self {
        Self {
            agents: Arc::new(
                LocalAgents::new(&config.workspace_root)
                    .without_env(config.unset_env.clone())
                    .with_envs(config.set_env.clone()),
            ),
            controller: Arc::new(LocalExecutor::new()),
            trigger: Arc::new(LogTrigger),
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// One step of a dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    /// Step name
    pub name: String,
    /// What it would do
    pub action: String,
    /// Its predicate
    pub condition: String,
    /// Whether the predicate holds for this run
    pub will_run: bool,
    /// Whether a failure would stop the run
    pub halt_on_failure: bool,
    /// Wall-clock limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Attempts
    pub attempts: u32,
}

impl PlannedStep {
    fn new(step: &Step, platform: &Platform, gate: &PublishGate) -> Self {
        Self {
            name: step.name.clone(),
            action: step.action.to_string(),
            condition: step.when.to_string(),
            will_run: step.when.evaluate(platform, gate),
            halt_on_failure: step.halt_on_failure,
            timeout: step.timeout,
            attempts: step.attempts,
        }
    }
}

/// What a run would do, without running it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    /// Platform being built
    pub platform: Platform,
    /// Repository
    pub repository: String,
    /// Branch
    pub branch: String,
    /// Publish decisions
    pub gate: PublishGate,
    /// Steps in order
    pub steps: Vec<PlannedStep>,
}

impl fmt::Display for RunPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} from {} ({})", self.platform, self.repository, self.branch)?;
        for (i, step) in self.steps.iter().enumerate() {
            let mark = if step.will_run { "run " } else { "skip" };
            write!(f, "  {:>2}. [{mark}] {}", i + 1, step.name)?;
            if step.halt_on_failure {
                write!(f, " (halting)")?;
            }
            writeln!(f, ": {}", step.action)?;
        }
        Ok(())
    }
}

/// Creates and drives pipeline runs
pub struct Orchestrator {
    matrix: Arc<PlatformMatrix>,
    pipeline: Arc<Pipeline>,
    source: SourceConfig,
    policy: PublishPolicy,
    agents: Arc<dyn AgentProvider>,
    sequencer: StepSequencer,
    metrics: Arc<MetricsCollector>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("platforms", &self.matrix.len())
            .field("pipeline", &self.pipeline.name)
            .field("source", &self.source)
            .field("sequencer", &self.sequencer)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Builds an orchestrator from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or the resulting pipeline is
    /// invalid.
    pub fn new(config: &Config, collaborators: Collaborators) -> Result<Self, PipelineError> {
        config.validate()?;
        let matrix = config.matrix()?;
        let pipeline = config.pipeline();
        pipeline.validate()?;

        let sequencer = StepSequencer::new(
            Arc::new(config.layout.clone()),
            collaborators.controller,
            collaborators.trigger,
        )
        .with_retry_delay(config.retry_delay());

        Ok(Self {
            matrix: Arc::new(matrix),
            pipeline: Arc::new(pipeline),
            source: config.source.clone(),
            policy: config.publish.clone(),
            agents: collaborators.agents,
            sequencer,
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    /// Platform table
    #[must_use]
    pub fn matrix(&self) -> &PlatformMatrix {
        &self.matrix
    }

    /// Pipeline every run executes
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run metrics
    #[must_use]
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// Publish gate derived from the configured branch policy
    #[must_use]
    pub fn gate_for(&self, input: &TriggerInput) -> PublishGate {
        self.policy.gate_for(self.branch(input))
    }

    fn repository<'a>(&'a self, input: &'a TriggerInput) -> &'a str {
        input.repository.as_deref().unwrap_or(&self.source.repository)
    }

    fn branch<'a>(&'a self, input: &'a TriggerInput) -> &'a str {
        input.branch.as_deref().unwrap_or(&self.source.branch)
    }

    /// Creates a pending run for `input`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownPlatform`] if the platform key is not
    /// in the matrix.
    pub fn prepare(
        &self,
        input: &TriggerInput,
        gate: PublishGate,
    ) -> Result<PipelineRun, PipelineError> {
        let platform = self.matrix.lookup(&input.platform)?.clone();
        PipelineRun::new(platform, self.repository(input), self.branch(input), gate)
    }

    /// Lists every step with its predicate result, executing nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownPlatform`] for an unknown platform.
    pub fn plan(&self, input: &TriggerInput) -> Result<RunPlan, PipelineError> {
        let platform = self.matrix.lookup(&input.platform)?.clone();
        let gate = self.gate_for(input);
        let steps = self
            .pipeline
            .steps
            .iter()
            .map(|step| PlannedStep::new(step, &platform, &gate))
            .collect();
        Ok(RunPlan {
            platform,
            repository: self.repository(input).to_string(),
            branch: self.branch(input).to_string(),
            gate,
            steps,
        })
    }

    /// Runs the pipeline for one trigger with the policy-derived gate.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform is unknown or its agent cannot be
    /// reached. Step failures are reported in the [`RunReport`].
    pub async fn run(
        &self,
        input: &TriggerInput,
        stop: StopSignal,
    ) -> Result<RunReport, PipelineError> {
        self.run_with_gate(input, self.gate_for(input), stop).await
    }

    /// Runs the pipeline with an explicit publish gate.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::run`].
    pub async fn run_with_gate(
        &self,
        input: &TriggerInput,
        gate: PublishGate,
        mut stop: StopSignal,
    ) -> Result<RunReport, PipelineError> {
        let run = self.prepare(input, gate)?;
        let span = tracing::info_span!(
            "run",
            run_id = %run.id(),
            platform = %run.platform().key,
        );

        async move {
            let agent = self.agents.connect(run.platform()).await?;
            let report = self
                .sequencer
                .run(&self.pipeline, run, &agent, &mut stop)
                .await;
            self.metrics.record(RunMetrics::from_report(&report));
            Ok::<_, PipelineError>(report)
        }
        .instrument(span)
        .await
    }

    /// Runs several triggers concurrently; results come back in input order
    pub async fn run_many(
        &self,
        inputs: &[TriggerInput],
        stop: &StopSignal,
    ) -> Vec<Result<RunReport, PipelineError>> {
        tracing::info!(runs = inputs.len(), "Starting concurrent runs");
        join_all(inputs.iter().map(|input| self.run(input, stop.clone()))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::traits::{AgentSession, ArtifactTransfer, CommandOutput};
    use crate::pipeline::package::names;
    use crate::pipeline::{RunStatus, keys};
    use async_trait::async_trait;
    use std::path::Path;

    /// Agent that reports a build whose version depends on the platform
    struct EchoAgent {
        platform: Platform,
    }

    #[async_trait]
    impl CommandRunner for EchoAgent {
        async fn run(&self, argv: &[String]) -> Result<CommandOutput, PipelineError> {
            let line = argv.join(" ");
            let stdout = if line.contains("VERSION.major") {
                // slow enough for concurrent runs to interleave
                tokio::time::sleep(Duration::from_millis(20)).await;
                format!("1.{}.0\nc0ffee{:04}", self.platform.arch.len(), self.platform.key.len())
            } else if line.starts_with("git log") {
                "subject\nC\nc@example.com\nA\na@example.com".to_string()
            } else if line.contains("print-JULIA_BINARYDIST_FILENAME") {
                format!("JULIA_BINARYDIST_FILENAME=julia-{}", self.platform.key)
            } else {
                String::new()
            };
            Ok(CommandOutput {
                exit_code: 0,
                stdout,
                stderr: String::new(),
            })
        }
    }

    struct NoopTransfer;

    #[async_trait]
    impl ArtifactTransfer for NoopTransfer {
        async fn transfer(&self, _: &str, _: &Path) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    struct EchoAgents;

    #[async_trait]
    impl AgentProvider for EchoAgents {
        async fn connect(&self, platform: &Platform) -> Result<AgentSession, PipelineError> {
            Ok(AgentSession {
                runner: Arc::new(EchoAgent {
                    platform: platform.clone(),
                }),
                transfer: Arc::new(NoopTransfer),
            })
        }
    }

    struct OkController;

    #[async_trait]
    impl CommandRunner for OkController {
        async fn run(&self, _: &[String]) -> Result<CommandOutput, PipelineError> {
            Ok(CommandOutput::default())
        }
    }

    fn orchestrator() -> Orchestrator {
        let config = Config {
            retry_delay_secs: 0,
            ..Config::default()
        };
        Orchestrator::new(
            &config,
            Collaborators {
                agents: Arc::new(EchoAgents),
                controller: Arc::new(OkController),
                trigger: Arc::new(LogTrigger),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_plan_lists_predicates() {
        let orch = orchestrator();
        let plan = orch.plan(&TriggerInput::new("package_osx64")).unwrap();
        assert_eq!(plan.steps.len(), 17);
        assert_eq!(plan.branch, "master");
        let will_run = |name: &str| plan.steps.iter().find(|s| s.name == name).unwrap().will_run;
        assert!(will_run(names::BREW));
        assert!(!will_run(names::WIN_EXTRAS));
        assert!(will_run(names::UPLOAD_LATEST));
        assert!(plan.to_string().contains("[skip] make win-extras"));

        let plan = orch
            .plan(&TriggerInput::new("package_osx64").with_branch("feature"))
            .unwrap();
        assert!(!plan.gate.publishable_event);
        assert!(!plan.steps.iter().any(|s| s.name == names::UPLOAD && s.will_run));
    }

    #[test]
    fn test_unknown_platform() {
        let orch = orchestrator();
        assert_eq!(
            orch.plan(&TriggerInput::new("package_beos")).unwrap_err(),
            PipelineError::UnknownPlatform("package_beos".into())
        );
        assert!(
            orch.prepare(&TriggerInput::new("package_beos"), PublishGate::closed())
                .is_err()
        );
    }

    #[test]
    fn test_prepare_uses_overrides() {
        let orch = orchestrator();
        let input = TriggerInput::new("package_linux64")
            .with_repository("https://example.com/julia.git")
            .with_branch("release-0.6");
        let run = orch.prepare(&input, PublishGate::closed()).unwrap();
        assert_eq!(
            run.store().get_text(keys::REPOSITORY).unwrap(),
            "https://example.com/julia.git"
        );
        assert_eq!(run.store().get_text(keys::BRANCH).unwrap(), "release-0.6");
    }

    #[tokio::test]
    async fn test_run_records_metrics() {
        let orch = orchestrator();
        let report = orch
            .run(&TriggerInput::new("package_linux64"), StopSignal::never())
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Succeeded);
        let metrics = orch.metrics().get(report.id).unwrap();
        assert_eq!(metrics.platform, "package_linux64");
        assert_eq!(metrics.failed_steps, 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let orch = orchestrator();
        let keys_in = ["package_linux64", "package_win32", "package_linuxarmv7l", "build_ubuntu32"];
        let inputs: Vec<TriggerInput> = keys_in.iter().map(|k| TriggerInput::new(*k)).collect();

        let reports = orch.run_many(&inputs, &StopSignal::never()).await;
        assert_eq!(reports.len(), keys_in.len());

        let matrix = orch.matrix();
        for (key, report) in keys_in.iter().zip(reports) {
            let report = report.unwrap();
            let platform = matrix.lookup(key).unwrap();
            assert_eq!(report.platform, *key);
            assert_eq!(report.status, RunStatus::Succeeded);
            assert_eq!(report.property(keys::UP_ARCH), Some(platform.arch.as_str()));
            assert_eq!(report.property(keys::FLAGS), Some(platform.flags.as_str()));
            assert_eq!(
                report.property(keys::MAJMIN),
                Some(format!("1.{}", platform.arch.len()).as_str())
            );
            assert_eq!(
                report.property(keys::ARTIFACT_FILENAME),
                Some(format!("julia-{key}{}", platform.os.artifact_extension()).as_str())
            );
        }
        assert_eq!(orch.metrics().get_all().len(), keys_in.len());
    }

    #[tokio::test]
    async fn test_run_many_stops_all() {
        let orch = orchestrator();
        let (handle, stop) = StopSignal::channel();
        handle.stop();
        let inputs = [TriggerInput::new("package_linux64"), TriggerInput::new("package_osx64")];
        for report in orch.run_many(&inputs, &stop).await {
            assert_eq!(report.unwrap().status, RunStatus::FailedHalted);
        }
    }
}
