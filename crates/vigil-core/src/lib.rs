//! Vigil Core Library
//!
//! Validation pipeline execution engine: registers pipelines of analysis rules,
//! queues executions by priority, runs them under a concurrency limit, scores
//! the results and applies low-risk remediations with reversible backups.

pub mod aggregate;
pub mod analyzer;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod fakes;
pub mod history;
pub mod metrics;
pub mod obs;
pub mod queue;
pub mod registry;
pub mod remediation;
pub mod runner;
pub mod scheduler;
pub mod stats;
pub mod telemetry;

pub use analyzer::{Analyzer, AnalyzerRegistry, CommandAnalyzer};
pub use config::EngineConfig;
pub use domain::{
    AnalysisReport, AnalyzerKind, ContextOverrides, Environment, Execution, ExecutionId, ExecutionStatus,
    Pipeline, PipelineId, PipelineSpec, RemediationAction, RemediationKind, RemediationRecord,
    RemediationState, ResultStatus, RiskLevel, Rule, RuleOutcome, RuleResult, RunContext,
};
pub use engine::{DispatcherHandle, Engine, EngineBuilder};
pub use error::{
    AnalyzerError, BackupError, EngineError, ExecutionError, RemediationError, Result,
    RuleExecutionError, ValidationError,
};
pub use events::{EngineEvent, EventBus, EventKind, EventStream};
pub use metrics::METRICS;
pub use remediation::{
    BackupRecord, BackupStore, FileModificationHandler, FsBackupStore, HandlerSet,
    RemediationCoordinator, RemediationHandler,
};
pub use scheduler::PipelineScheduler;
pub use stats::{AnalyzerStats, ExecutionStats, StatsTracker};
pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
