//! Analyzer adapter contract and the typed registry of adapters.
//!
//! An analyzer evaluates one rule against a run context. The engine never looks
//! inside it: it only invokes `execute`, bounds it with a timeout, and turns any
//! error into a failed result.

pub mod command;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{AnalyzerKind, Rule, RuleOutcome, RunContext};
use crate::error::AnalyzerError;

pub use command::CommandAnalyzer;

/// Uniform interface over an external analyzer.
///
/// Implementations must be safe to call concurrently for different rules.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn kind(&self) -> AnalyzerKind;

    /// Whether results from this analyzer contribute to the alignment score.
    fn alignment_bearing(&self) -> bool {
        false
    }

    /// Called once per rule at registration time.
    fn validate_rule_config(&self, _config: &serde_json::Value) -> Result<(), AnalyzerError> {
        Ok(())
    }

    async fn execute(&self, rule: &Rule, context: &RunContext)
        -> Result<RuleOutcome, AnalyzerError>;
}

/// Analyzer adapters keyed by kind. At most one adapter per kind.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: HashMap<AnalyzerKind, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing and returning any previous one of the same kind.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.insert(analyzer.kind(), analyzer)
    }

    pub fn with(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.register(analyzer);
        self
    }

    pub fn get(&self, kind: AnalyzerKind) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: AnalyzerKind) -> bool {
        self.analyzers.contains_key(&kind)
    }

    pub fn kinds(&self) -> BTreeSet<AnalyzerKind> {
        self.analyzers.keys().copied().collect()
    }

    pub fn alignment_kinds(&self) -> BTreeSet<AnalyzerKind> {
        self.analyzers
            .values()
            .filter(|a| a.alignment_bearing())
            .map(|a| a.kind())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedAnalyzer;

    #[test]
    fn register_replaces_same_kind() {
        let mut registry = AnalyzerRegistry::new();
        assert!(registry
            .register(Arc::new(ScriptedAnalyzer::new(AnalyzerKind::Ux)))
            .is_none());
        assert!(registry
            .register(Arc::new(ScriptedAnalyzer::new(AnalyzerKind::Ux)))
            .is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn alignment_kinds_only_lists_flagged_adapters() {
        let registry = AnalyzerRegistry::new()
            .with(Arc::new(ScriptedAnalyzer::new(AnalyzerKind::Ux)))
            .with(Arc::new(
                ScriptedAnalyzer::new(AnalyzerKind::Philosophy).with_alignment(),
            ));
        assert_eq!(
            registry.alignment_kinds().into_iter().collect::<Vec<_>>(),
            vec![AnalyzerKind::Philosophy]
        );
        assert!(registry.contains(AnalyzerKind::Ux));
        assert!(!registry.contains(AnalyzerKind::Performance));
    }
}
