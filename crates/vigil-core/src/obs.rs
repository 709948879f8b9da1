//! Structured log lines for the execution lifecycle.
//!
//! Every helper logs an `event = "..."` field so log pipelines can filter on it.
//! Set `VIGIL_LOG` / `RUST_LOG` to tune verbosity.

use tracing::{debug, info, warn};

use crate::domain::{ExecutionId, PipelineId};

/// RAII guard that enters an execution-scoped span.
///
/// Only hold it in synchronous sections; async code should use
/// [`execution_span`] with `Instrument`.
pub struct ExecutionSpan {
    _span: tracing::span::EnteredSpan,
}

impl ExecutionSpan {
    pub fn enter(execution_id: ExecutionId, pipeline_id: PipelineId) -> Self {
        Self {
            _span: execution_span(execution_id, pipeline_id).entered(),
        }
    }
}

pub fn execution_span(execution_id: ExecutionId, pipeline_id: PipelineId) -> tracing::Span {
    tracing::info_span!("vigil.execution", execution_id = %execution_id, pipeline_id = %pipeline_id)
}

pub fn emit_pipeline_registered(pipeline_id: PipelineId, name: &str, rules: usize) {
    info!(event = "pipeline.registered", pipeline_id = %pipeline_id, name = %name, rules);
}

pub fn emit_execution_queued(execution_id: ExecutionId, pipeline_id: PipelineId, position: usize) {
    debug!(event = "execution.queued", execution_id = %execution_id, pipeline_id = %pipeline_id, position);
}

pub fn emit_execution_started(execution_id: ExecutionId, pipeline_id: PipelineId, priority: i32) {
    info!(event = "execution.started", execution_id = %execution_id, pipeline_id = %pipeline_id, priority);
}

pub fn emit_execution_finished(
    execution_id: ExecutionId,
    duration_ms: u64,
    results: usize,
    final_score: Option<f64>,
    success: bool,
) {
    info!(
        event = "execution.finished",
        execution_id = %execution_id,
        duration_ms,
        results,
        final_score = final_score.unwrap_or(0.0),
        success,
    );
}

pub fn emit_rule_timed_out(rule_id: &str, timeout_ms: u64) {
    warn!(event = "rule.timed_out", rule_id = %rule_id, timeout_ms);
}

pub fn emit_remediation_applied(action_id: &str, backup_ref: Option<&str>) {
    info!(event = "remediation.applied", action_id = %action_id, backup_ref = backup_ref.unwrap_or("-"));
}

pub fn emit_remediation_skipped(action_id: &str, reason: &dyn std::fmt::Display) {
    debug!(event = "remediation.skipped", action_id = %action_id, reason = %reason);
}

pub fn emit_remediation_failed(action_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "remediation.failed", action_id = %action_id, error = %error);
}
