//! Pipeline runs
//!
//! A [`PipelineRun`] is the mutable state of one platform build: its property
//! store, its status and the outcomes recorded so far. It is owned by whoever
//! drives it until it reaches a terminal status, then turned into a
//! [`RunReport`].

use super::traits::TriggerPayload;
use crate::pipeline::{
    PipelineError, Platform, PropertyStore, PropertyValue, PublishGate, RunStatus, StepOutcome,
    StepResult, keys,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::watch;
use uuid::Uuid;

/// What an upstream trigger asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerInput {
    /// Platform key
    pub platform: String,
    /// Repository override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Branch override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl TriggerInput {
    /// Build of `platform` from the configured repository and branch
    #[must_use]
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            repository: None,
            branch: None,
        }
    }

    /// Overrides the repository
    #[must_use]
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    /// Overrides the branch
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// Sending side of a stop signal
#[derive(Debug)]
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    /// Asks every run holding a matching [`StopSignal`] to stop
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

/// Receiving side of a stop signal, cloned into every run
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    /// Creates a connected handle and signal
    #[must_use]
    pub fn channel() -> (StopHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (StopHandle(tx), Self(rx))
    }

    /// A signal that never fires
    #[must_use]
    pub fn never() -> Self {
        Self::channel().1
    }

    /// Returns true once a stop was requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once a stop is requested; pends forever if the handle is gone
    pub async fn stopped(&mut self) {
        let closed = self.0.wait_for(|stopped| *stopped).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

/// State of one platform build
#[derive(Debug)]
pub struct PipelineRun {
    id: Uuid,
    platform: Platform,
    gate: PublishGate,
    store: PropertyStore,
    status: RunStatus,
    outcomes: Vec<StepOutcome>,
    trigger: Option<TriggerPayload>,
}

impl PipelineRun {
    /// Creates a pending run and seeds its store with the run inputs.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store rejects a write, which cannot
    /// happen for a fresh store.
    pub fn new(
        platform: Platform,
        repository: &str,
        branch: &str,
        gate: PublishGate,
    ) -> Result<Self, PipelineError> {
        let mut store = PropertyStore::new();
        store.set(keys::PLATFORM, platform.key.as_str())?;
        store.set(keys::AGENT, platform.agent.as_str())?;
        store.set(keys::OS_NAME, platform.os.store_name())?;
        store.set(keys::UP_ARCH, platform.arch.as_str())?;
        store.set(keys::FLAGS, platform.flags.as_str())?;
        store.set(keys::REPOSITORY, repository)?;
        store.set(keys::BRANCH, branch)?;

        Ok(Self {
            id: Uuid::new_v4(),
            platform,
            gate,
            store,
            status: RunStatus::Pending,
            outcomes: Vec::new(),
            trigger: None,
        })
    }

    /// Run id
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Platform being built
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Publish decisions for this run
    #[must_use]
    pub fn gate(&self) -> &PublishGate {
        &self.gate
    }

    /// Current properties
    #[must_use]
    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Outcomes recorded so far
    #[must_use]
    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    pub(crate) fn start(&mut self) {
        self.status = RunStatus::Running;
    }

    pub(crate) fn store_mut(&mut self) -> &mut PropertyStore {
        &mut self.store
    }

    pub(crate) fn record(&mut self, outcome: StepOutcome) {
        self.outcomes.push(outcome);
    }

    pub(crate) fn set_trigger(&mut self, payload: TriggerPayload) {
        self.trigger = Some(payload);
    }

    /// Computes the terminal status, freezes the store and produces the
    /// report.
    #[must_use]
    pub fn finish(mut self) -> RunReport {
        self.status = if self.outcomes.iter().any(|o| o.halted) {
            RunStatus::FailedHalted
        } else if self.outcomes.iter().any(|o| o.result.is_failure()) {
            RunStatus::FailedContinued
        } else {
            RunStatus::Succeeded
        };
        self.store.freeze();

        RunReport {
            id: self.id,
            platform: self.platform.key,
            status: self.status,
            outcomes: self.outcomes,
            properties: self.store.snapshot(),
            trigger: self.trigger,
        }
    }
}

/// Final record of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run id
    pub id: Uuid,
    /// Platform key
    pub platform: String,
    /// Terminal status
    pub status: RunStatus,
    /// Step outcomes in execution order
    pub outcomes: Vec<StepOutcome>,
    /// Frozen property snapshot
    pub properties: BTreeMap<String, PropertyValue>,
    /// Payload handed to the downstream consumer, if triggered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerPayload>,
}

impl RunReport {
    /// Outcome of a step by name
    #[must_use]
    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.name == step)
    }

    /// Number of outcomes with the given result
    #[must_use]
    pub fn count(&self, result: StepResult) -> usize {
        self.outcomes.iter().filter(|o| o.result == result).count()
    }

    /// Text property from the snapshot
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(PropertyValue::as_text)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}]: {}", self.platform, self.id, self.status)?;
        for outcome in &self.outcomes {
            writeln!(f, "  {outcome}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PlatformMatrix, default_platforms};
    use std::time::Duration;

    fn platform(key: &str) -> Platform {
        PlatformMatrix::from_entries(&default_platforms())
            .unwrap()
            .lookup(key)
            .unwrap()
            .clone()
    }

    fn outcome(name: &str, result: StepResult, halted: bool) -> StepOutcome {
        StepOutcome {
            name: name.into(),
            result,
            halted,
            duration: Duration::ZERO,
            error: None,
        }
    }

    #[test]
    fn test_new_run_seeds_store() {
        let run = PipelineRun::new(
            platform("package_win32"),
            "git://github.com/JuliaLang/julia.git",
            "master",
            PublishGate::closed(),
        )
        .unwrap();
        let store = run.store();
        assert_eq!(run.status(), RunStatus::Pending);
        assert_eq!(store.get_text(keys::OS_NAME).unwrap(), "winnt");
        assert_eq!(store.get_text(keys::UP_ARCH).unwrap(), "x86");
        assert_eq!(store.get_text(keys::FLAGS).unwrap(), "ARCH=i686");
        assert_eq!(store.get_text(keys::BRANCH).unwrap(), "master");
        assert!(!store.contains(keys::MAJMIN));
    }

    #[test]
    fn test_finish_status_rules() {
        let new_run = || {
            PipelineRun::new(platform("package_linux64"), "r", "master", PublishGate::closed())
                .unwrap()
        };

        let mut run = new_run();
        run.record(outcome("a", StepResult::Success, false));
        run.record(outcome("b", StepResult::Skipped, false));
        assert_eq!(run.finish().status, RunStatus::Succeeded);

        let mut run = new_run();
        run.record(outcome("a", StepResult::Failure, false));
        run.record(outcome("b", StepResult::Success, false));
        assert_eq!(run.finish().status, RunStatus::FailedContinued);

        let mut run = new_run();
        run.record(outcome("a", StepResult::Failure, false));
        run.record(outcome("b", StepResult::Failure, true));
        let report = run.finish();
        assert_eq!(report.status, RunStatus::FailedHalted);
        assert_eq!(report.count(StepResult::Failure), 2);
    }

    #[test]
    fn test_report_carries_snapshot() {
        let run =
            PipelineRun::new(platform("package_osx64"), "r", "release-0.6", PublishGate::closed())
                .unwrap();
        let report = run.finish();
        assert_eq!(report.property(keys::OS_NAME), Some("mac"));
        assert_eq!(report.property(keys::BRANCH), Some("release-0.6"));
        assert!(report.trigger.is_none());
    }

    #[tokio::test]
    async fn test_stop_signal() {
        let (handle, mut signal) = StopSignal::channel();
        assert!(!signal.is_stopped());
        handle.stop();
        signal.stopped().await;
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_never_signal_pends() {
        let mut signal = StopSignal::never();
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.stopped()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_trigger_input_builder() {
        let input = TriggerInput::new("package_linux64").with_branch("release-0.6");
        assert_eq!(input.branch.as_deref(), Some("release-0.6"));
        assert!(input.repository.is_none());
    }
}
