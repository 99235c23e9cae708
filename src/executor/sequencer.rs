//! Step sequencer
//!
//! Executes a pipeline's steps strictly in order for one run. For each step:
//! evaluate its predicate, render its command against the store as it is
//! right now, execute it on the agent or the controller, and merge whatever
//! its extractor reports. Halting failures and cancellation end the run.

use super::run::{PipelineRun, RunReport, StopSignal};
use super::traits::{AgentSession, CommandOutput, CommandRunner, DownstreamTrigger, TriggerPayload};
use crate::pipeline::extract::CommitMetadata;
use crate::pipeline::render::{self, CommandRenderer, RenderContext, ReleaseLayout};
use crate::pipeline::steps::{Location, StepAction};
use crate::pipeline::{
    Pipeline, PipelineError, PropertyUpdate, PublishGate, Step, StepOutcome, StepResult, keys,
};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pause between attempts of a retried step
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// What a successful step leaves behind
#[derive(Debug, Default)]
struct StepEffect {
    update: PropertyUpdate,
    trigger: Option<TriggerPayload>,
}

/// Drives the steps of one run
#[derive(Clone)]
pub struct StepSequencer {
    layout: Arc<ReleaseLayout>,
    controller: Arc<dyn CommandRunner>,
    trigger: Arc<dyn DownstreamTrigger>,
    retry_delay: Duration,
}

impl fmt::Debug for StepSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSequencer")
            .field("layout", &self.layout)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl StepSequencer {
    /// Creates a sequencer that runs controller commands on `controller`
    #[must_use]
    pub fn new(
        layout: Arc<ReleaseLayout>,
        controller: Arc<dyn CommandRunner>,
        trigger: Arc<dyn DownstreamTrigger>,
    ) -> Self {
        Self {
            layout,
            controller,
            trigger,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Sets the pause between attempts
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Runs every step of `pipeline` and returns the terminal report.
    ///
    /// The run is consumed; its store is frozen in the report.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        mut run: PipelineRun,
        agent: &AgentSession,
        stop: &mut StopSignal,
    ) -> RunReport {
        run.start();
        tracing::info!(
            pipeline = %pipeline.name,
            steps = pipeline.step_count(),
            "Run started"
        );

        for step in &pipeline.steps {
            if !step.when.evaluate(run.platform(), run.gate()) {
                tracing::info!(step = %step.name, condition = %step.when, "Step skipped");
                run.record(StepOutcome {
                    name: step.name.clone(),
                    result: StepResult::Skipped,
                    halted: false,
                    duration: Duration::ZERO,
                    error: None,
                });
                continue;
            }

            tracing::info!(step = %step.name, "Step started");
            let started = Instant::now();

            let result = {
                let ctx = RenderContext {
                    store: run.store(),
                    platform: run.platform(),
                    layout: self.layout.as_ref(),
                };
                tokio::select! {
                    biased;
                    () = stop.stopped() => Err(PipelineError::Cancelled),
                    result = self.execute(step, &ctx, run.gate(), agent) => result,
                }
            };
            let result = result.and_then(|effect| {
                run.store_mut().merge(effect.update)?;
                Ok(effect.trigger)
            });
            let duration = started.elapsed();

            match result {
                Ok(trigger) => {
                    if let Some(payload) = trigger {
                        run.set_trigger(payload);
                    }
                    tracing::info!(
                        step = %step.name,
                        duration_ms = duration.as_millis(),
                        "Step succeeded"
                    );
                    run.record(StepOutcome {
                        name: step.name.clone(),
                        result: StepResult::Success,
                        halted: false,
                        duration,
                        error: None,
                    });
                }
                Err(err) => {
                    let halted = step.halt_on_failure
                        || matches!(
                            err,
                            PipelineError::Cancelled | PipelineError::PublishFailure { .. }
                        );
                    if halted {
                        tracing::error!(step = %step.name, error = %err, "Step failed, halting run");
                    } else {
                        tracing::warn!(step = %step.name, error = %err, "Step failed, continuing");
                    }
                    run.record(StepOutcome {
                        name: step.name.clone(),
                        result: StepResult::Failure,
                        halted,
                        duration,
                        error: Some(err.to_string()),
                    });
                    if halted {
                        break;
                    }
                }
            }
        }

        let report = run.finish();
        tracing::info!(status = %report.status, "Run finished");
        report
    }

    /// Executes one step with its timeout and retry policy
    async fn execute(
        &self,
        step: &Step,
        ctx: &RenderContext<'_>,
        gate: &PublishGate,
        agent: &AgentSession,
    ) -> Result<StepEffect, PipelineError> {
        let mut attempt = 1;
        let attempts = async {
            loop {
                match self.attempt(step, ctx, gate, agent).await {
                    Ok(effect) => return Ok(effect),
                    Err(err) if attempt < step.attempts && is_retryable(&err) => {
                        tracing::warn!(
                            step = %step.name,
                            attempt,
                            max_attempts = step.attempts,
                            error = %err,
                            "Step failed, retrying"
                        );
                        attempt += 1;
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        // One limit covers every attempt and the pauses between them
        let result = match step.timeout {
            Some(limit) => tokio::time::timeout(limit, attempts)
                .await
                .unwrap_or_else(|_| Err(PipelineError::StepTimeout { duration: limit })),
            None => attempts.await,
        };
        result.map_err(|err| exhausted(step, ctx, attempt, err))
    }

    async fn attempt(
        &self,
        step: &Step,
        ctx: &RenderContext<'_>,
        gate: &PublishGate,
        agent: &AgentSession,
    ) -> Result<StepEffect, PipelineError> {
        match &step.action {
            StepAction::Command { location, command } => {
                let argv = command.resolve(ctx)?;
                let runner: &dyn CommandRunner = match location {
                    Location::Agent => agent.runner.as_ref(),
                    Location::Controller => self.controller.as_ref(),
                };
                let output = run_checked(runner, &argv).await?;
                let update = match step.extractor {
                    Some(extractor) => {
                        let update = extractor.extract(
                            output.exit_code,
                            &output.stdout,
                            &output.stderr,
                            ctx.platform.os,
                        )?;
                        if update.is_empty() {
                            tracing::debug!(step = %step.name, %extractor, "Nothing extracted");
                        }
                        update
                    }
                    None => PropertyUpdate::new(),
                };
                Ok(StepEffect {
                    update,
                    trigger: None,
                })
            }
            StepAction::Transfer => {
                let filename = ctx.store.get_text(keys::ARTIFACT_FILENAME)?;
                let destination = self.layout.staged_path(filename);
                agent.transfer.transfer(filename, &destination).await?;
                Ok(StepEffect::default())
            }
            StepAction::Publish { latest } => {
                let renderer = if *latest {
                    CommandRenderer::LatestUpload
                } else {
                    CommandRenderer::Upload
                };
                let argv = renderer.render(ctx)?;
                run_checked(self.controller.as_ref(), &argv).await?;
                Ok(StepEffect::default())
            }
            StepAction::TriggerDownstream => {
                let Some(consumer) = &gate.downstream_consumer else {
                    return Ok(StepEffect::default());
                };
                let payload = trigger_payload(ctx)?;
                self.trigger.dispatch(consumer, payload.clone())?;
                Ok(StepEffect {
                    update: PropertyUpdate::new(),
                    trigger: Some(payload),
                })
            }
        }
    }
}

async fn run_checked(
    runner: &dyn CommandRunner,
    argv: &[String],
) -> Result<CommandOutput, PipelineError> {
    tracing::debug!(command = %shell_words::join(argv), "Running command");
    let output = runner.run(argv).await?;
    if output.is_success() {
        Ok(output)
    } else {
        Err(PipelineError::CommandFailed {
            code: output.exit_code,
            stderr: output.stderr.trim_end().to_string(),
        })
    }
}

/// Failures that another attempt could plausibly fix
fn is_retryable(err: &PipelineError) -> bool {
    matches!(
        err,
        PipelineError::CommandFailed { .. }
            | PipelineError::StepTimeout { .. }
            | PipelineError::TransferFailure { .. }
            | PipelineError::Io(_)
    )
}

/// Final error of a step whose attempts are used up
fn exhausted(
    step: &Step,
    ctx: &RenderContext<'_>,
    attempts: u32,
    err: PipelineError,
) -> PipelineError {
    let StepAction::Publish { latest } = step.action else {
        return err;
    };
    if !is_retryable(&err) {
        return err;
    }

    let destination = ctx
        .destination()
        .map(|dest| dest.target(latest).to_string())
        .unwrap_or_default();
    PipelineError::PublishFailure {
        destination,
        attempts,
        reason: err.to_string(),
    }
}

fn trigger_payload(ctx: &RenderContext<'_>) -> Result<TriggerPayload, PipelineError> {
    let id = ctx.artifact()?;
    let commit = CommitMetadata::from_record(ctx.store.get_record(keys::COMMIT)?)?;
    Ok(TriggerPayload {
        url: render::download_url(ctx.layout, &id),
        commitmessage: commit.commitmessage,
        commitname: commit.commitname,
        commitemail: commit.commitemail,
        authorname: commit.authorname,
        authoremail: commit.authoremail,
        shortcommit: id.shortcommit,
    })
}
