//! Metrics collection
//!
//! Keeps a summary of every finished run, keyed by run id.

use crate::executor::RunReport;
use crate::pipeline::{RunStatus, StepResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Summary of one finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetrics {
    /// Run id
    pub run_id: Uuid,

    /// Platform key
    pub platform: String,

    /// Terminal status
    pub status: RunStatus,

    /// Wall-clock time across all steps
    pub duration: Duration,

    /// Steps that succeeded
    pub succeeded_steps: usize,

    /// Steps that failed
    pub failed_steps: usize,

    /// Steps whose predicate was false
    pub skipped_steps: usize,
}

impl RunMetrics {
    /// Summarizes a report
    #[must_use]
    pub fn from_report(report: &RunReport) -> Self {
        Self {
            run_id: report.id,
            platform: report.platform.clone(),
            status: report.status,
            duration: report.outcomes.iter().map(|o| o.duration).sum(),
            succeeded_steps: report.count(StepResult::Success),
            failed_steps: report.count(StepResult::Failure),
            skipped_steps: report.count(StepResult::Skipped),
        }
    }
}

/// Metrics collector for pipeline runs
#[derive(Debug, Default)]
pub struct MetricsCollector {
    runs: RwLock<HashMap<Uuid, RunMetrics>>,
}

impl MetricsCollector {
    /// Creates a new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records metrics for a finished run
    pub fn record(&self, metrics: RunMetrics) {
        self.runs.write().insert(metrics.run_id, metrics);
    }

    /// Gets metrics for a specific run
    #[must_use]
    pub fn get(&self, run_id: Uuid) -> Option<RunMetrics> {
        self.runs.read().get(&run_id).cloned()
    }

    /// Gets all recorded metrics
    #[must_use]
    pub fn get_all(&self) -> Vec<RunMetrics> {
        self.runs.read().values().cloned().collect()
    }

    /// Number of recorded runs that did not succeed
    #[must_use]
    pub fn failures(&self) -> usize {
        self.runs
            .read()
            .values()
            .filter(|m| !m.status.is_success())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StepOutcome;
    use std::collections::BTreeMap;

    fn report(status: RunStatus) -> RunReport {
        let outcome = |name: &str, result, ms| StepOutcome {
            name: name.into(),
            result,
            halted: false,
            duration: Duration::from_millis(ms),
            error: None,
        };
        RunReport {
            id: Uuid::new_v4(),
            platform: "package_linux64".into(),
            status,
            outcomes: vec![
                outcome("make", StepResult::Success, 30),
                outcome("brew", StepResult::Skipped, 0),
                outcome("git log", StepResult::Failure, 12),
            ],
            properties: BTreeMap::new(),
            trigger: None,
        }
    }

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new();
        assert!(collector.get(Uuid::new_v4()).is_none());
        assert!(collector.get_all().is_empty());
    }

    #[test]
    fn test_metrics_from_report() {
        let metrics = RunMetrics::from_report(&report(RunStatus::FailedContinued));
        assert_eq!(metrics.duration, Duration::from_millis(42));
        assert_eq!(metrics.succeeded_steps, 1);
        assert_eq!(metrics.skipped_steps, 1);
        assert_eq!(metrics.failed_steps, 1);
    }

    #[test]
    fn test_metrics_collector_record() {
        let collector = MetricsCollector::new();
        let ok = RunMetrics::from_report(&report(RunStatus::Succeeded));
        let failed = RunMetrics::from_report(&report(RunStatus::FailedHalted));
        collector.record(ok.clone());
        collector.record(failed);

        assert_eq!(collector.get(ok.run_id), Some(ok));
        assert_eq!(collector.get_all().len(), 2);
        assert_eq!(collector.failures(), 1);
    }
}
