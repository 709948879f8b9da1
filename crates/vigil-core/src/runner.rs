//! Runs the rules of one admitted execution.
//!
//! Rules run one at a time in declaration order. A timeout or analyzer error
//! becomes a failed result with score 0; it never aborts the execution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::aggregate;
use crate::analyzer::AnalyzerRegistry;
use crate::config::EngineConfig;
use crate::domain::{Execution, Pipeline, Rule, RuleOutcome, RuleResult, RunContext};
use crate::error::RuleExecutionError;
use crate::metrics::METRICS;
use crate::obs;
use crate::remediation::RemediationCoordinator;

pub struct ExecutionRunner {
    analyzers: AnalyzerRegistry,
    remediation: Arc<RemediationCoordinator>,
}

impl ExecutionRunner {
    pub fn new(analyzers: AnalyzerRegistry, remediation: Arc<RemediationCoordinator>) -> Self {
        Self {
            analyzers,
            remediation,
        }
    }

    /// Fill in results and scores, leaving `execution` completed.
    ///
    /// `config` is the snapshot taken when the execution started.
    pub async fn run(&self, pipeline: &Pipeline, execution: &mut Execution, config: &EngineConfig) {
        for rule in &pipeline.rules {
            let mut result = self.run_rule(rule, &execution.context, config).await;
            METRICS.inc_rules_executed();

            if config.enable_auto_fix
                && result.score < config.auto_fix_threshold
                && !result.remediation_actions.is_empty()
            {
                let records = self
                    .remediation
                    .remediate(
                        execution.id,
                        &mut result,
                        &execution.context,
                        config.backup_before_fix,
                    )
                    .await;
                execution.remediations.extend(records);
            }
            execution.results.push(result);
        }

        let final_score = aggregate::final_score(&execution.results, &config.analyzer_weights);
        let alignment_score = aggregate::alignment_score(
            &execution.results,
            &self.analyzers.alignment_kinds(),
            &config.alignment_weights,
        );
        execution.complete(final_score, alignment_score);
    }

    async fn run_rule(&self, rule: &Rule, context: &RunContext, config: &EngineConfig) -> RuleResult {
        let start = Instant::now();
        let outcome = self.invoke(rule, context, config).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(outcome) => RuleResult::from_outcome(rule, outcome, elapsed_ms),
            Err(e) => {
                tracing::debug!(rule_id = %rule.id, error = %e, "rule failed");
                RuleResult::failure(rule, e.to_string(), elapsed_ms)
            }
        }
    }

    async fn invoke(
        &self,
        rule: &Rule,
        context: &RunContext,
        config: &EngineConfig,
    ) -> Result<RuleOutcome, RuleExecutionError> {
        let unavailable = || RuleExecutionError::Unavailable { kind: rule.analyzer };
        if !config.is_enabled(rule.analyzer) {
            return Err(unavailable());
        }
        let analyzer = self.analyzers.get(rule.analyzer).ok_or_else(unavailable)?;

        let budget = rule
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.default_timeout());
        match tokio::time::timeout(budget, analyzer.execute(rule, context)).await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => {
                let timeout_ms = budget.as_millis() as u64;
                METRICS.inc_rule_timeouts();
                obs::emit_rule_timed_out(&rule.id, timeout_ms);
                Err(RuleExecutionError::Timeout {
                    rule_id: rule.id.clone(),
                    timeout_ms,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AnalyzerKind, PipelineSpec, RemediationAction, RemediationKind, RemediationState,
        ResultStatus, RiskLevel,
    };
    use crate::events::EventBus;
    use crate::fakes::{RecordingHandler, Script, ScriptedAnalyzer};
    use crate::remediation::{FsBackupStore, HandlerSet};
    use crate::stats::StatsTracker;
    use uuid::Uuid;

    fn pipeline(rules: Vec<Rule>) -> Pipeline {
        Pipeline::from_spec(Uuid::new_v4(), PipelineSpec::new("p", rules))
    }

    fn runner_with(
        analyzers: AnalyzerRegistry,
        handler: Arc<RecordingHandler>,
        backups: &tempfile::TempDir,
    ) -> ExecutionRunner {
        let coordinator = RemediationCoordinator::new(
            HandlerSet::new().with(handler),
            Arc::new(FsBackupStore::new(backups.path())),
            Arc::new(StatsTracker::new()),
            Arc::new(EventBus::new()),
        );
        ExecutionRunner::new(analyzers, Arc::new(coordinator))
    }

    fn running(pipeline: &Pipeline) -> Execution {
        let mut exec = Execution::new(pipeline.id, 0, RunContext::default());
        exec.mark_running();
        exec
    }

    #[tokio::test]
    async fn results_follow_declaration_order_despite_latency() {
        let arch = ScriptedAnalyzer::new(AnalyzerKind::Architecture).script_delayed(
            "slow",
            Script::Outcome(RuleOutcome::passed(1.0, "ok")),
            Duration::from_millis(30),
        );
        let perf = ScriptedAnalyzer::new(AnalyzerKind::Performance);
        let analyzers = AnalyzerRegistry::new()
            .with(Arc::new(arch))
            .with(Arc::new(perf));
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_with(
            analyzers,
            Arc::new(RecordingHandler::new(RemediationKind::FileModification)),
            &dir,
        );
        let p = pipeline(vec![
            Rule::new("fast", AnalyzerKind::Performance),
            Rule::new("slow", AnalyzerKind::Architecture),
            Rule::new("last", AnalyzerKind::Performance),
        ]);
        let mut exec = running(&p);

        runner.run(&p, &mut exec, &EngineConfig::default()).await;

        let ids: Vec<_> = exec.results.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["fast", "slow", "last"]);
        assert_eq!(exec.final_score, Some(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_and_error_become_failed_results() {
        let analyzer = ScriptedAnalyzer::new(AnalyzerKind::Ux)
            .script_delayed(
                "hangs",
                Script::Outcome(RuleOutcome::passed(1.0, "late")),
                Duration::from_secs(60),
            )
            .script("broken", Script::Fail("parser crashed".into()));
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_with(
            AnalyzerRegistry::new().with(Arc::new(analyzer)),
            Arc::new(RecordingHandler::new(RemediationKind::FileModification)),
            &dir,
        );
        let p = pipeline(vec![
            Rule::new("hangs", AnalyzerKind::Ux).with_timeout_ms(100),
            Rule::new("broken", AnalyzerKind::Ux),
            Rule::new("fine", AnalyzerKind::Ux),
        ]);
        let mut exec = running(&p);

        runner.run(&p, &mut exec, &EngineConfig::default()).await;

        assert_eq!(exec.results.len(), 3);
        assert_eq!(exec.results[0].status, ResultStatus::Failed);
        assert_eq!(exec.results[0].score, 0.0);
        assert!(exec.results[0].message.contains("timed out after 100ms"));
        assert!(exec.results[1].message.contains("parser crashed"));
        assert!(exec.results[2].passed());
        assert!((exec.final_score.unwrap() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn disabled_analyzer_yields_unavailable_result() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_with(
            AnalyzerRegistry::new().with(Arc::new(ScriptedAnalyzer::new(AnalyzerKind::Ux))),
            Arc::new(RecordingHandler::new(RemediationKind::FileModification)),
            &dir,
        );
        let p = pipeline(vec![Rule::new("r", AnalyzerKind::Ux)]);
        let mut exec = running(&p);
        let config = EngineConfig {
            enabled_analyzers: [AnalyzerKind::Architecture].into_iter().collect(),
            ..EngineConfig::default()
        };

        runner.run(&p, &mut exec, &config).await;

        assert!(!exec.results[0].passed());
        assert!(exec.results[0].message.contains("unavailable"));
    }

    #[tokio::test]
    async fn only_results_below_threshold_are_remediated() {
        let fix = |id: &str| {
            RemediationAction::new(id, RemediationKind::FileModification, "f", RiskLevel::Low)
        };
        let analyzer = ScriptedAnalyzer::new(AnalyzerKind::Architecture)
            .outcome("low", RuleOutcome::failed(0.3, "bad").with_action(fix("a-low")))
            .outcome("high", RuleOutcome::passed(0.9, "good").with_action(fix("a-high")));
        let handler = Arc::new(RecordingHandler::new(RemediationKind::FileModification));
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_with(
            AnalyzerRegistry::new().with(Arc::new(analyzer)),
            handler.clone(),
            &dir,
        );
        let p = pipeline(vec![
            Rule::new("low", AnalyzerKind::Architecture),
            Rule::new("high", AnalyzerKind::Architecture),
        ]);
        let mut exec = running(&p);
        let config = EngineConfig {
            backup_before_fix: false,
            ..EngineConfig::default()
        };

        runner.run(&p, &mut exec, &config).await;

        assert_eq!(handler.apply_count(), 1);
        assert_eq!(handler.applied()[0].id, "a-low");
        assert_eq!(exec.remediations.len(), 1);
        assert_eq!(exec.remediations[0].state, RemediationState::Applied);
    }

    #[tokio::test]
    async fn auto_fix_disabled_never_dispatches() {
        let analyzer = ScriptedAnalyzer::new(AnalyzerKind::Architecture).outcome(
            "r",
            RuleOutcome::failed(0.0, "bad").with_action(RemediationAction::new(
                "a",
                RemediationKind::FileModification,
                "f",
                RiskLevel::Low,
            )),
        );
        let handler = Arc::new(RecordingHandler::new(RemediationKind::FileModification));
        let dir = tempfile::tempdir().unwrap();
        let runner = runner_with(
            AnalyzerRegistry::new().with(Arc::new(analyzer)),
            handler.clone(),
            &dir,
        );
        let p = pipeline(vec![Rule::new("r", AnalyzerKind::Architecture)]);
        let mut exec = running(&p);
        let config = EngineConfig {
            enable_auto_fix: false,
            ..EngineConfig::default()
        };

        runner.run(&p, &mut exec, &config).await;

        assert_eq!(handler.apply_count(), 0);
        assert!(exec.remediations.is_empty());
    }
}
