//! Process-wide atomic counters.
//!
//! Counters are bumped silently at the call site. Call [`Metrics::flush`] to
//! emit the current values as one `tracing::info!` event, e.g. when the engine
//! goes idle.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters; no allocation on the hot path.
#[derive(Debug)]
pub struct Metrics {
    executions_started: AtomicU64,
    executions_failed: AtomicU64,
    rules_executed: AtomicU64,
    rule_timeouts: AtomicU64,
    remediations_applied: AtomicU64,
    remediations_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            executions_started: AtomicU64::new(0),
            executions_failed: AtomicU64::new(0),
            rules_executed: AtomicU64::new(0),
            rule_timeouts: AtomicU64::new(0),
            remediations_applied: AtomicU64::new(0),
            remediations_failed: AtomicU64::new(0),
        }
    }

    pub fn inc_executions_started(&self) {
        self.executions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_executions_failed(&self) {
        self.executions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rules_executed(&self) {
        self.rules_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rule_timeouts(&self) {
        self.rule_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_remediations_applied(&self) {
        self.remediations_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_remediations_failed(&self) {
        self.remediations_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            executions_started = self.executions_started(),
            executions_failed = self.executions_failed(),
            rules_executed = self.rules_executed(),
            rule_timeouts = self.rule_timeouts(),
            remediations_applied = self.remediations_applied(),
            remediations_failed = self.remediations_failed(),
        );
    }

    pub fn executions_started(&self) -> u64 {
        self.executions_started.load(Ordering::Relaxed)
    }

    pub fn executions_failed(&self) -> u64 {
        self.executions_failed.load(Ordering::Relaxed)
    }

    pub fn rules_executed(&self) -> u64 {
        self.rules_executed.load(Ordering::Relaxed)
    }

    pub fn rule_timeouts(&self) -> u64 {
        self.rule_timeouts.load(Ordering::Relaxed)
    }

    pub fn remediations_applied(&self) -> u64 {
        self.remediations_applied.load(Ordering::Relaxed)
    }

    pub fn remediations_failed(&self) -> u64 {
        self.remediations_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.executions_started,
            &self.executions_failed,
            &self.rules_executed,
            &self.rule_timeouts,
            &self.remediations_applied,
            &self.remediations_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
