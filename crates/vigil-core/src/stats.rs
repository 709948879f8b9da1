//! Lifetime-cumulative execution statistics.
//!
//! Every average is maintained incrementally, `mean += (value - mean) / count`.
//! There is no decay and no window. Updates go through a single mutex so
//! concurrent completions cannot lose increments.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::domain::{AnalyzerKind, Execution, ExecutionStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerStats {
    /// Number of results produced.
    pub executions: u64,
    /// Fraction of results that passed.
    pub success_rate: f64,
    pub mean_score: f64,
}

/// Snapshot of the running aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Terminal executions seen. Never decreases.
    pub total_executions: u64,
    pub completed_executions: u64,
    /// Fraction of terminal executions that completed.
    pub success_rate: f64,
    pub mean_duration_ms: f64,
    /// Mean final score over completed executions.
    pub mean_final_score: f64,
    /// Mean alignment score over completed executions.
    pub alignment_score: f64,
    pub remediations_applied: u64,
    pub per_analyzer: BTreeMap<AnalyzerKind, AnalyzerStats>,
}

pub(crate) fn incremental_mean(mean: f64, value: f64, count: u64) -> f64 {
    if count == 0 {
        return mean;
    }
    mean + (value - mean) / count as f64
}

#[derive(Debug, Default)]
pub struct StatsTracker {
    inner: Mutex<ExecutionStats>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a terminal execution into the aggregates. Non-terminal executions are
    /// ignored.
    pub fn record_execution(&self, execution: &Execution) {
        if !execution.status.is_terminal() {
            return;
        }
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        stats.total_executions += 1;
        let n = stats.total_executions;
        let completed = execution.status == ExecutionStatus::Completed;
        stats.success_rate =
            incremental_mean(stats.success_rate, if completed { 1.0 } else { 0.0 }, n);
        stats.mean_duration_ms =
            incremental_mean(stats.mean_duration_ms, execution.duration_ms() as f64, n);

        if completed {
            stats.completed_executions += 1;
            let c = stats.completed_executions;
            stats.mean_final_score = incremental_mean(
                stats.mean_final_score,
                execution.final_score.unwrap_or(0.0),
                c,
            );
            stats.alignment_score = incremental_mean(
                stats.alignment_score,
                execution.alignment_score.unwrap_or(0.0),
                c,
            );
        }

        for result in &execution.results {
            let entry = stats.per_analyzer.entry(result.analyzer).or_default();
            entry.executions += 1;
            let k = entry.executions;
            entry.success_rate = incremental_mean(
                entry.success_rate,
                if result.passed() { 1.0 } else { 0.0 },
                k,
            );
            entry.mean_score = incremental_mean(entry.mean_score, result.score, k);
        }
    }

    pub fn record_remediation_applied(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remediations_applied += 1;
    }

    pub fn snapshot(&self) -> ExecutionStats {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Rule, RuleOutcome, RuleResult, RunContext};
    use uuid::Uuid;

    fn execution(results: Vec<RuleResult>, completed: bool) -> Execution {
        let mut exec = Execution::new(Uuid::new_v4(), 0, RunContext::default());
        exec.mark_running();
        exec.results = results;
        if completed {
            exec.complete(0.8, 0.5);
        } else {
            exec.fail("boom");
        }
        exec
    }

    #[test]
    fn incremental_mean_matches_arithmetic_mean() {
        let values = [0.2, 0.9, 0.4, 1.0];
        let mut mean = 0.0;
        for (i, v) in values.iter().enumerate() {
            mean = incremental_mean(mean, *v, i as u64 + 1);
        }
        assert!((mean - 0.625).abs() < 1e-12);
    }

    #[test]
    fn success_rate_counts_failed_executions() {
        let tracker = StatsTracker::new();
        tracker.record_execution(&execution(vec![], true));
        tracker.record_execution(&execution(vec![], false));

        let stats = tracker.snapshot();
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.completed_executions, 1);
        assert_eq!(stats.success_rate, 0.5);
        assert_eq!(stats.mean_final_score, 0.8);
        assert_eq!(stats.alignment_score, 0.5);
    }

    #[test]
    fn per_analyzer_breakdown_tracks_results() {
        let rule = Rule::new("r", AnalyzerKind::Performance);
        let tracker = StatsTracker::new();
        tracker.record_execution(&execution(
            vec![
                RuleResult::from_outcome(&rule, RuleOutcome::passed(1.0, ""), 1),
                RuleResult::failure(&rule, "timeout", 1),
            ],
            true,
        ));

        let stats = tracker.snapshot();
        let perf = &stats.per_analyzer[&AnalyzerKind::Performance];
        assert_eq!(perf.executions, 2);
        assert_eq!(perf.success_rate, 0.5);
        assert_eq!(perf.mean_score, 0.5);
    }

    #[test]
    fn pending_executions_are_ignored() {
        let tracker = StatsTracker::new();
        tracker.record_execution(&Execution::new(Uuid::new_v4(), 0, RunContext::default()));
        assert_eq!(tracker.snapshot().total_executions, 0);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let tracker = StatsTracker::new();
        let before = tracker.snapshot();
        tracker.record_remediation_applied();
        assert_eq!(before.remediations_applied, 0);
        assert_eq!(tracker.snapshot().remediations_applied, 1);
    }
}
