//! Error taxonomy for the validation engine.
//!
//! Registration problems surface synchronously as [`ValidationError`]. Run-time
//! failures are recovered where they happen: a [`RuleExecutionError`] becomes a
//! failed result, a [`RemediationError`] becomes an `autofix:failed` event, and an
//! [`ExecutionError`] terminates only the execution it belongs to.

use uuid::Uuid;

use crate::domain::{AnalyzerKind, RemediationKind};

/// Errors raised while registering a pipeline. The pipeline is never stored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("analyzer '{kind}' is not registered or not enabled")]
    UnknownAnalyzer { kind: AnalyzerKind },

    #[error("rule '{rule_id}' uses analyzer '{kind}' which the pipeline does not declare")]
    UndeclaredAnalyzer { rule_id: String, kind: AnalyzerKind },

    #[error("duplicate rule id '{rule_id}'")]
    DuplicateRule { rule_id: String },

    #[error("rule id must not be empty")]
    EmptyRuleId,

    #[error("invalid config for rule '{rule_id}': {reason}")]
    InvalidRuleConfig { rule_id: String, reason: String },
}

/// Typed failure reported by an analyzer adapter.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("invalid rule config: {0}")]
    InvalidConfig(String),

    #[error("analysis failed: {0}")]
    Failed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-rule failure. Always recovered into a failed result with score 0.
#[derive(Debug, thiserror::Error)]
pub enum RuleExecutionError {
    #[error("rule '{rule_id}' timed out after {timeout_ms}ms")]
    Timeout { rule_id: String, timeout_ms: u64 },

    #[error("analyzer '{kind}' is unavailable")]
    Unavailable { kind: AnalyzerKind },

    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
}

/// Whole-execution failure. Reported through `execution:failed`, never returned
/// to the caller that requested the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("pipeline {0} no longer exists")]
    PipelineNotFound(Uuid),

    #[error("execution task panicked: {0}")]
    Panicked(String),

    #[error("execution task was cancelled")]
    Cancelled,
}

/// Errors raised by the backup store.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("backup not found: {0}")]
    NotFound(String),

    #[error("backup checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure applying one remediation action. Never changes execution status.
#[derive(Debug, thiserror::Error)]
pub enum RemediationError {
    #[error("no handler registered for '{0}' actions")]
    NoHandler(RemediationKind),

    #[error("backup failed: {0}")]
    Backup(#[from] BackupError),

    #[error("malformed changes for action '{action_id}': {reason}")]
    MalformedChanges { action_id: String, reason: String },

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Engine-level errors returned to callers.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("pipeline not found: {0}")]
    PipelineNotFound(Uuid),

    #[error("pipeline is disabled: {0}")]
    PipelineDisabled(Uuid),

    #[error("invalid engine config: {0}")]
    InvalidConfig(String),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("remediation error: {0}")]
    Remediation(#[from] RemediationError),

    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
