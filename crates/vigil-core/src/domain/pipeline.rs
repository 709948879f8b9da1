//! Pipeline definitions and the context they run against.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rule::{AnalyzerKind, Rule};

pub type PipelineId = Uuid;

/// Deployment environment a run targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

/// What a pipeline is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunContext {
    pub project_path: PathBuf,
    pub target_files: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub environment: Environment,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RunContext {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
            ..Self::default()
        }
    }

    /// Return a copy of this context with every field set in `overrides` replaced.
    /// Metadata keys are merged, override values win.
    pub fn merged(&self, overrides: ContextOverrides) -> RunContext {
        let mut ctx = self.clone();
        if let Some(path) = overrides.project_path {
            ctx.project_path = path;
        }
        if let Some(files) = overrides.target_files {
            ctx.target_files = files;
        }
        if let Some(patterns) = overrides.exclude_patterns {
            ctx.exclude_patterns = patterns;
        }
        if let Some(env) = overrides.environment {
            ctx.environment = env;
        }
        ctx.metadata.extend(overrides.metadata);
        ctx
    }
}

/// Partial context supplied when requesting a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOverrides {
    pub project_path: Option<PathBuf>,
    pub target_files: Option<Vec<String>>,
    pub exclude_patterns: Option<Vec<String>>,
    pub environment: Option<Environment>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Registration input. The registry assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub rules: Vec<Rule>,
    /// Analyzer kinds this pipeline runs. Derived from the rules when empty.
    #[serde(default)]
    pub analyzers: Vec<AnalyzerKind>,
    #[serde(default)]
    pub context: RunContext,
    /// Handed to the external scheduler when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
}

fn default_enabled() -> bool {
    true
}

impl PipelineSpec {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            rules,
            analyzers: Vec::new(),
            context: RunContext::default(),
            schedule: None,
            enabled: true,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_analyzers(mut self, analyzers: Vec<AnalyzerKind>) -> Self {
        self.analyzers = analyzers;
        self
    }

    pub fn with_context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Declared analyzer kinds in declaration order, without duplicates.
    /// Falls back to the order in which rules first mention a kind.
    pub fn analyzer_set(&self) -> Vec<AnalyzerKind> {
        let source: Box<dyn Iterator<Item = AnalyzerKind> + '_> = if self.analyzers.is_empty() {
            Box::new(self.rules.iter().map(|r| r.analyzer))
        } else {
            Box::new(self.analyzers.iter().copied())
        };
        let mut kinds = Vec::new();
        for kind in source {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }
}

/// A registered pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub name: String,
    pub description: String,
    pub rules: Vec<Rule>,
    pub analyzers: Vec<AnalyzerKind>,
    pub context: RunContext,
    pub schedule: Option<String>,
    pub enabled: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

impl Pipeline {
    pub(crate) fn from_spec(id: PipelineId, spec: PipelineSpec) -> Self {
        let analyzers = spec.analyzer_set();
        Self {
            id,
            name: spec.name,
            description: spec.description,
            rules: spec.rules,
            analyzers,
            context: spec.context,
            schedule: spec.schedule,
            enabled: spec.enabled,
            priority: spec.priority,
            created_at: Utc::now(),
        }
    }
}
