//! Remediation actions proposed by analyzers and their lifecycle.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side-effect family an action belongs to. Each kind has one dispatch handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationKind {
    FileModification,
    DependencyUpdate,
    ConfigChange,
    CodeGeneration,
}

impl fmt::Display for RemediationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileModification => write!(f, "file_modification"),
            Self::DependencyUpdate => write!(f, "dependency_update"),
            Self::ConfigChange => write!(f, "config_change"),
            Self::CodeGeneration => write!(f, "code_generation"),
        }
    }
}

/// Risk level declared by the analyzer that proposed an action.
///
/// Only `Low` actions are ever applied without a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A proposed automated fix attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub id: String,
    pub kind: RemediationKind,
    #[serde(default)]
    pub description: String,
    pub target_path: PathBuf,
    #[serde(default)]
    pub changes: serde_json::Value,
    /// Set by the coordinator when a backup was taken before applying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_ref: Option<String>,
    #[serde(default)]
    pub rollback_instructions: String,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub requires_approval: bool,
}

impl RemediationAction {
    pub fn new(
        id: impl Into<String>,
        kind: RemediationKind,
        target_path: impl Into<PathBuf>,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            description: String::new(),
            target_path: target_path.into(),
            changes: serde_json::Value::Null,
            backup_ref: None,
            rollback_instructions: String::new(),
            risk_level,
            requires_approval: false,
        }
    }

    pub fn with_changes(mut self, changes: serde_json::Value) -> Self {
        self.changes = changes;
        self
    }

    pub fn requiring_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }
}

/// Lifecycle of one action: `Proposed -> {Applied | Skipped | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationState {
    Proposed,
    Applied,
    Skipped,
    Failed,
}

impl RemediationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Proposed)
    }
}

/// Audit entry for one remediation decision, kept on the execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationRecord {
    pub action_id: String,
    pub rule_id: String,
    pub kind: RemediationKind,
    pub state: RemediationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}
