//! Registered pipelines.
//!
//! Reads take a shared lock; register, pause, resume and delete take the write
//! lock. Lifecycle operations only report `true` when they changed something, so
//! repeating one is harmless and emits nothing.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use crate::analyzer::AnalyzerRegistry;
use crate::domain::{AnalyzerKind, Pipeline, PipelineId, PipelineSpec, Rule};
use crate::error::ValidationError;

/// Principles a philosophy rule may list under `config.principles`.
pub const PHILOSOPHY_PRINCIPLES: [&str; 7] = [
    "bien_comun",
    "ayni",
    "cooperacion",
    "economia_sagrada",
    "metanoia",
    "negentropia",
    "vocacion",
];

/// Check a pipeline spec against the analyzers the engine can run.
///
/// `enabled` narrows `analyzers` to the kinds switched on in the config.
pub fn validate_spec(
    spec: &PipelineSpec,
    analyzers: &AnalyzerRegistry,
    enabled: &BTreeSet<AnalyzerKind>,
) -> Result<(), ValidationError> {
    let known = |kind: AnalyzerKind| analyzers.contains(kind) && enabled.contains(&kind);
    let declared = spec.analyzer_set();

    let mut seen = HashSet::new();
    for rule in &spec.rules {
        if rule.id.trim().is_empty() {
            return Err(ValidationError::EmptyRuleId);
        }
        if !seen.insert(rule.id.as_str()) {
            return Err(ValidationError::DuplicateRule {
                rule_id: rule.id.clone(),
            });
        }
        if !known(rule.analyzer) {
            return Err(ValidationError::UnknownAnalyzer {
                kind: rule.analyzer,
            });
        }
        if !declared.contains(&rule.analyzer) {
            return Err(ValidationError::UndeclaredAnalyzer {
                rule_id: rule.id.clone(),
                kind: rule.analyzer,
            });
        }
        if let Some(analyzer) = analyzers.get(rule.analyzer) {
            analyzer
                .validate_rule_config(&rule.config)
                .map_err(|e| ValidationError::InvalidRuleConfig {
                    rule_id: rule.id.clone(),
                    reason: e.to_string(),
                })?;
        }
        if rule.analyzer == AnalyzerKind::Philosophy {
            check_principles(rule)?;
        }
    }

    if let Some(kind) = declared.into_iter().find(|k| !known(*k)) {
        return Err(ValidationError::UnknownAnalyzer { kind });
    }
    Ok(())
}

fn check_principles(rule: &Rule) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidRuleConfig {
        rule_id: rule.id.clone(),
        reason,
    };
    let Some(principles) = rule.config.get("principles") else {
        return Ok(());
    };
    let entries = principles
        .as_array()
        .ok_or_else(|| invalid("'principles' must be an array".to_string()))?;
    for entry in entries {
        match entry.as_str() {
            Some(name) if PHILOSOPHY_PRINCIPLES.contains(&name) => {}
            _ => return Err(invalid(format!("unknown philosophy principle {entry}"))),
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct PipelineRegistry {
    pipelines: RwLock<HashMap<PipelineId, Pipeline>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a pipeline under a fresh id.
    pub fn register(
        &self,
        spec: PipelineSpec,
        analyzers: &AnalyzerRegistry,
        enabled: &BTreeSet<AnalyzerKind>,
    ) -> Result<Pipeline, ValidationError> {
        validate_spec(&spec, analyzers, enabled)?;
        let pipeline = Pipeline::from_spec(Uuid::new_v4(), spec);
        self.pipelines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pipeline.id, pipeline.clone());
        Ok(pipeline)
    }

    /// Disable a pipeline. `false` if unknown or already paused.
    pub fn pause(&self, id: PipelineId) -> bool {
        self.set_enabled(id, false)
    }

    /// Re-enable a pipeline. `false` if unknown or already enabled.
    pub fn resume(&self, id: PipelineId) -> bool {
        self.set_enabled(id, true)
    }

    fn set_enabled(&self, id: PipelineId, enabled: bool) -> bool {
        let mut pipelines = self
            .pipelines
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match pipelines.get_mut(&id) {
            Some(p) if p.enabled != enabled => {
                p.enabled = enabled;
                true
            }
            _ => false,
        }
    }

    /// Remove a pipeline, returning it if it existed.
    pub fn delete(&self, id: PipelineId) -> Option<Pipeline> {
        self.pipelines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn get(&self, id: PipelineId) -> Option<Pipeline> {
        self.pipelines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Snapshot of every pipeline, highest priority first, then oldest first.
    pub fn list(&self) -> Vec<Pipeline> {
        let mut pipelines: Vec<Pipeline> = self
            .pipelines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        pipelines.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        pipelines
    }

    pub fn len(&self) -> usize {
        self.pipelines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
