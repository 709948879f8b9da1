//! Engine configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::AnalyzerKind;
use crate::error::{EngineError, Result};

/// Recognized engine options. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of executions running at the same time.
    pub max_concurrent_rules: usize,
    /// Per-rule timeout unless the rule sets its own.
    pub default_timeout_ms: u64,
    pub enabled_analyzers: BTreeSet<AnalyzerKind>,
    /// Final-score weight per analyzer kind. Missing kinds weigh 1.
    pub analyzer_weights: BTreeMap<AnalyzerKind, f64>,
    /// Alignment weight per sub-score label. Missing labels weigh 1.
    pub alignment_weights: BTreeMap<String, f64>,
    pub enable_auto_fix: bool,
    /// Results scoring strictly below this are handed to remediation.
    pub auto_fix_threshold: f64,
    pub backup_before_fix: bool,
    pub backup_dir: PathBuf,
    /// Minimum priority picked up by `Engine::trigger_critical`.
    pub critical_priority: i32,
    /// Whether `Engine::trigger_adaptive` queues anything.
    pub adaptive_scheduling: bool,
    /// Executions kept for `Engine::execution(s)`. Oldest finished ones go
    /// first; pending and running executions are never evicted.
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_rules: 3,
            default_timeout_ms: 30_000,
            enabled_analyzers: AnalyzerKind::ALL.into_iter().collect(),
            analyzer_weights: BTreeMap::new(),
            alignment_weights: BTreeMap::new(),
            enable_auto_fix: true,
            auto_fix_threshold: 0.7,
            backup_before_fix: true,
            backup_dir: PathBuf::from(".vigil/backups"),
            critical_priority: 8,
            adaptive_scheduling: true,
            history_limit: 1000,
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        let config: EngineConfig = serde_json::from_slice(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_rules == 0 {
            return Err(invalid("max_concurrent_rules must be at least 1"));
        }
        if self.history_limit == 0 {
            return Err(invalid("history_limit must be at least 1"));
        }
        if self.default_timeout_ms == 0 {
            return Err(invalid("default_timeout_ms must be positive"));
        }
        if !(0.0..=1.0).contains(&self.auto_fix_threshold) {
            return Err(invalid(format!(
                "auto_fix_threshold must be within [0, 1], got {}",
                self.auto_fix_threshold
            )));
        }
        for (kind, weight) in &self.analyzer_weights {
            check_weight(&kind.to_string(), *weight)?;
        }
        for (label, weight) in &self.alignment_weights {
            check_weight(label, *weight)?;
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn is_enabled(&self, kind: AnalyzerKind) -> bool {
        self.enabled_analyzers.contains(&kind)
    }
}

fn check_weight(name: &str, weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(invalid(format!(
            "weight for '{name}' must be finite and non-negative, got {weight}"
        )));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::InvalidConfig(msg.into())
}
