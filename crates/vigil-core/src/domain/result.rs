//! Per-rule results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::remediation::RemediationAction;
use super::rule::{AnalyzerKind, Rule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Passed,
    Failed,
}

/// What an analyzer reports for one rule. The runner stamps identity and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub status: ResultStatus,
    pub score: f64,
    #[serde(default)]
    pub message: String,
    /// Named sub-scores, e.g. per alignment principle.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub remediation_actions: Vec<RemediationAction>,
}

impl RuleOutcome {
    pub fn passed(score: f64, message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Passed,
            score,
            message: message.into(),
            metrics: BTreeMap::new(),
            remediation_actions: Vec::new(),
        }
    }

    pub fn failed(score: f64, message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Failed,
            ..Self::passed(score, message)
        }
    }

    pub fn with_metric(mut self, label: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(label.into(), value);
        self
    }

    pub fn with_action(mut self, action: RemediationAction) -> Self {
        self.remediation_actions.push(action);
        self
    }
}

/// Outcome of one rule evaluation, owned by its execution. Never mutated once
/// appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub analyzer: AnalyzerKind,
    pub status: ResultStatus,
    /// Always within `[0, 1]`.
    pub score: f64,
    pub message: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub remediation_actions: Vec<RemediationAction>,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl RuleResult {
    pub fn from_outcome(rule: &Rule, outcome: RuleOutcome, execution_time_ms: u64) -> Self {
        Self {
            rule_id: rule.id.clone(),
            analyzer: rule.analyzer,
            status: outcome.status,
            score: clamp_score(outcome.score),
            message: outcome.message,
            metrics: outcome
                .metrics
                .into_iter()
                .map(|(label, value)| (label, clamp_score(value)))
                .collect(),
            remediation_actions: outcome.remediation_actions,
            execution_time_ms,
            timestamp: Utc::now(),
        }
    }

    /// A failed result with score 0, used when the analyzer errored or timed out.
    pub fn failure(rule: &Rule, message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            rule_id: rule.id.clone(),
            analyzer: rule.analyzer,
            status: ResultStatus::Failed,
            score: 0.0,
            message: message.into(),
            metrics: BTreeMap::new(),
            remediation_actions: Vec::new(),
            execution_time_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ResultStatus::Passed
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Summary of an external analysis pass, input to `Engine::trigger_adaptive`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub overall_score: f64,
    pub philosophy_alignment: f64,
}

impl AnalysisReport {
    /// Below this overall score, architecture pipelines are re-run.
    pub const SCORE_FLOOR: f64 = 0.7;
    /// Below this alignment, philosophy pipelines are re-run.
    pub const ALIGNMENT_FLOOR: f64 = 0.8;

    pub fn new(overall_score: f64, philosophy_alignment: f64) -> Self {
        Self {
            overall_score,
            philosophy_alignment,
        }
    }

    /// Analyzer kinds whose pipelines this report calls for.
    pub fn weak_kinds(&self) -> Vec<AnalyzerKind> {
        let mut kinds = Vec::new();
        if self.overall_score < Self::SCORE_FLOOR {
            kinds.push(AnalyzerKind::Architecture);
        }
        if self.philosophy_alignment < Self::ALIGNMENT_FLOOR {
            kinds.push(AnalyzerKind::Philosophy);
        }
        kinds
    }
}
