//! Analyzer kinds and the rules bound to them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The analyzer family a rule is evaluated by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    Architecture,
    Ux,
    Performance,
    Philosophy,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 4] = [
        AnalyzerKind::Architecture,
        AnalyzerKind::Ux,
        AnalyzerKind::Performance,
        AnalyzerKind::Philosophy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Ux => "ux",
            Self::Performance => "performance",
            Self::Philosophy => "philosophy",
        }
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalyzerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown analyzer kind: {s}"))
    }
}

/// One unit of analysis configuration, bound to exactly one analyzer.
///
/// Immutable once attached to a registered pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub analyzer: AnalyzerKind,
    /// Analyzer-specific configuration, opaque to the engine.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Overrides the engine's default per-rule timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Rule {
    pub fn new(id: impl Into<String>, analyzer: AnalyzerKind) -> Self {
        Self {
            id: id.into(),
            analyzer,
            config: serde_json::Value::Null,
            timeout_ms: None,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_its_display_form() {
        for kind in AnalyzerKind::ALL {
            assert_eq!(kind.to_string().parse::<AnalyzerKind>().unwrap(), kind);
        }
        assert!("security".parse::<AnalyzerKind>().is_err());
    }

    #[test]
    fn rule_deserializes_without_optional_fields() {
        let rule: Rule = serde_json::from_str(r#"{"id":"r1","analyzer":"ux"}"#).unwrap();
        assert_eq!(rule.analyzer, AnalyzerKind::Ux);
        assert!(rule.config.is_null());
        assert_eq!(rule.timeout_ms, None);
    }

    #[test]
    fn kind_works_as_json_map_key() {
        let mut weights = std::collections::BTreeMap::new();
        weights.insert(AnalyzerKind::Performance, 2.0);
        let json = serde_json::to_string(&weights).unwrap();
        assert_eq!(json, r#"{"performance":2.0}"#);
    }
}
