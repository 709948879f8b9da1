//! Domain model: rules, pipelines, executions, results and remediation actions.

pub mod execution;
pub mod pipeline;
pub mod remediation;
pub mod result;
pub mod rule;

pub use execution::{Execution, ExecutionId, ExecutionStatus};
pub use pipeline::{ContextOverrides, Environment, Pipeline, PipelineId, PipelineSpec, RunContext};
pub use remediation::{
    RemediationAction, RemediationKind, RemediationRecord, RemediationState, RiskLevel,
};
pub use result::{AnalysisReport, ResultStatus, RuleOutcome, RuleResult};
pub use rule::{AnalyzerKind, Rule};
