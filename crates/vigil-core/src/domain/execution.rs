//! One run of a pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::pipeline::{PipelineId, RunContext};
use super::remediation::RemediationRecord;
use super::result::RuleResult;

pub type ExecutionId = Uuid;

/// `Pending -> Running -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub pipeline_id: PipelineId,
    pub priority: i32,
    pub status: ExecutionStatus,
    pub queued_at: DateTime<Utc>,
    /// Set when the execution is admitted and starts running.
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub context: RunContext,
    /// In rule declaration order.
    pub results: Vec<RuleResult>,
    pub remediations: Vec<RemediationRecord>,
    pub final_score: Option<f64>,
    pub alignment_score: Option<f64>,
    pub error: Option<String>,
}

impl Execution {
    pub fn new(pipeline_id: PipelineId, priority: i32, context: RunContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id,
            priority,
            status: ExecutionStatus::Pending,
            queued_at: Utc::now(),
            start_time: None,
            end_time: None,
            context,
            results: Vec::new(),
            remediations: Vec::new(),
            final_score: None,
            alignment_score: None,
            error: None,
        }
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = ExecutionStatus::Running;
        self.start_time = Some(Utc::now());
    }

    pub(crate) fn complete(&mut self, final_score: f64, alignment_score: f64) {
        self.final_score = Some(final_score);
        self.alignment_score = Some(alignment_score);
        self.status = ExecutionStatus::Completed;
        self.end_time = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: impl std::fmt::Display) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.to_string());
        self.end_time = Some(Utc::now());
    }

    /// Wall-clock duration between start and end, 0 while not terminal.
    pub fn duration_ms(&self) -> u64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            _ => 0,
        }
    }
}
