//! Gated remediation: decide, back up, dispatch, record.
//!
//! Each action on a qualifying result passes through [`gate::assess`] and is
//! consumed exactly once. Dispatch failures are reported as `autofix:failed`
//! and never change the status of the execution.

pub mod backup;
pub mod gate;
pub mod handler;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

pub use backup::{BackupRecord, BackupStore, FsBackupStore};
pub use gate::{assess, transition, GateDecision, SkipReason, Step};
pub use handler::{FileModificationHandler, HandlerSet, RemediationHandler};

use crate::domain::{
    ExecutionId, RemediationAction, RemediationRecord, RemediationState, RuleResult, RunContext,
};
use crate::error::{BackupError, RemediationError};
use crate::events::{EventBus, EventKind};
use crate::metrics::METRICS;
use crate::obs;
use crate::stats::StatsTracker;

/// Applies the remediation actions attached to rule results.
pub struct RemediationCoordinator {
    handlers: HandlerSet,
    backups: Arc<dyn BackupStore>,
    stats: Arc<StatsTracker>,
    events: Arc<EventBus>,
}

impl RemediationCoordinator {
    pub fn new(
        handlers: HandlerSet,
        backups: Arc<dyn BackupStore>,
        stats: Arc<StatsTracker>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            handlers,
            backups,
            stats,
            events,
        }
    }

    /// Process every action on `result` in order.
    ///
    /// `backup_ref` is written onto the result's actions before this returns, so
    /// the caller must run it before the result is appended to the execution.
    pub async fn remediate(
        &self,
        execution_id: ExecutionId,
        result: &mut RuleResult,
        context: &RunContext,
        backup_before_fix: bool,
    ) -> Vec<RemediationRecord> {
        let mut records = Vec::with_capacity(result.remediation_actions.len());
        for action in result.remediation_actions.iter_mut() {
            let record = self
                .process(execution_id, &result.rule_id, action, context, backup_before_fix)
                .await;
            records.push(record);
        }
        records
    }

    async fn process(
        &self,
        execution_id: ExecutionId,
        rule_id: &str,
        action: &mut RemediationAction,
        context: &RunContext,
        backup_before_fix: bool,
    ) -> RemediationRecord {
        let mut record = RemediationRecord {
            action_id: action.id.clone(),
            rule_id: rule_id.to_string(),
            kind: action.kind,
            state: RemediationState::Proposed,
            backup_ref: None,
            error: None,
            timestamp: Utc::now(),
        };

        if let GateDecision::Skip(reason) = assess(action) {
            obs::emit_remediation_skipped(&action.id, &reason);
            record.state = advance(record.state, Step::Skip);
            record.error = Some(reason.to_string());
            return record;
        }

        match self.dispatch(action, context, backup_before_fix).await {
            Ok(()) => {
                record.state = advance(record.state, Step::DispatchSucceeded);
                record.backup_ref = action.backup_ref.clone();
                self.stats.record_remediation_applied();
                METRICS.inc_remediations_applied();
                obs::emit_remediation_applied(&action.id, action.backup_ref.as_deref());
                self.events.publish(EventKind::AutofixApplied {
                    execution_id,
                    rule_id: rule_id.to_string(),
                    action: action.clone(),
                });
            }
            Err(e) => {
                record.state = advance(record.state, Step::DispatchFailed);
                record.backup_ref = action.backup_ref.clone();
                record.error = Some(e.to_string());
                METRICS.inc_remediations_failed();
                obs::emit_remediation_failed(&action.id, &e);
                self.events.publish(EventKind::AutofixFailed {
                    execution_id,
                    rule_id: rule_id.to_string(),
                    action: action.clone(),
                    error: e.to_string(),
                });
            }
        }
        record
    }

    async fn dispatch(
        &self,
        action: &mut RemediationAction,
        context: &RunContext,
        backup_before_fix: bool,
    ) -> Result<(), RemediationError> {
        let handler = self
            .handlers
            .get(action.kind)
            .ok_or(RemediationError::NoHandler(action.kind))?;

        let target = resolve_target(&action.target_path, context);
        if backup_before_fix {
            let backup = self.backups.create(&target)?;
            action.backup_ref = Some(backup.id);
        }

        let mut resolved = action.clone();
        resolved.target_path = target;
        handler.apply(&resolved).await
    }

    /// Restore the file captured by `backup_ref`. Never called automatically.
    pub fn rollback(&self, backup_ref: &str) -> Result<BackupRecord, BackupError> {
        self.backups.restore(backup_ref)
    }
}

/// `transition` is total from `Proposed`, the only state we ever advance from.
fn advance(from: RemediationState, step: Step) -> RemediationState {
    transition(from, step).unwrap_or(from)
}

fn resolve_target(path: &std::path::Path, context: &RunContext) -> PathBuf {
    if path.is_relative() && !context.project_path.as_os_str().is_empty() {
        context.project_path.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalyzerKind, RemediationKind, RiskLevel, Rule, RuleOutcome};
    use crate::fakes::RecordingHandler;
    use serde_json::json;
    use uuid::Uuid;

    struct Fixture {
        _dir: tempfile::TempDir,
        project: PathBuf,
        coordinator: RemediationCoordinator,
        handler: Arc<RecordingHandler>,
        stats: Arc<StatsTracker>,
        events: Arc<EventBus>,
    }

    fn fixture(handler: RecordingHandler) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        let handler = Arc::new(handler);
        let stats = Arc::new(StatsTracker::new());
        let events = Arc::new(EventBus::new());
        let coordinator = RemediationCoordinator::new(
            HandlerSet::new().with(handler.clone()),
            Arc::new(FsBackupStore::new(dir.path().join("backups"))),
            stats.clone(),
            events.clone(),
        );
        Fixture {
            _dir: dir,
            project,
            coordinator,
            handler,
            stats,
            events,
        }
    }

    fn result_with(actions: Vec<RemediationAction>) -> RuleResult {
        let rule = Rule::new("lint", AnalyzerKind::Architecture);
        let mut outcome = RuleOutcome::failed(0.2, "layering violated");
        for action in actions {
            outcome = outcome.with_action(action);
        }
        RuleResult::from_outcome(&rule, outcome, 5)
    }

    fn low(id: &str) -> RemediationAction {
        RemediationAction::new(id, RemediationKind::FileModification, "src/lib.rs", RiskLevel::Low)
            .with_changes(json!({"content": "fixed"}))
    }

    #[tokio::test]
    async fn low_risk_action_is_backed_up_and_applied_once() {
        let fx = fixture(RecordingHandler::new(RemediationKind::FileModification));
        let mut events = fx.events.subscribe();
        let mut result = result_with(vec![low("a1")]);
        let context = RunContext::new(&fx.project);

        let records = fx
            .coordinator
            .remediate(Uuid::new_v4(), &mut result, &context, true)
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, RemediationState::Applied);
        assert!(records[0].backup_ref.is_some());
        assert_eq!(result.remediation_actions[0].backup_ref, records[0].backup_ref);
        assert_eq!(fx.handler.apply_count(), 1);
        assert_eq!(
            fx.handler.applied()[0].target_path,
            fx.project.join("src/lib.rs")
        );
        assert_eq!(fx.stats.snapshot().remediations_applied, 1);

        let names: Vec<_> = events.drain().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["autofix:applied"]);
    }

    #[tokio::test]
    async fn gated_actions_are_skipped_silently() {
        let fx = fixture(RecordingHandler::new(RemediationKind::FileModification));
        let mut events = fx.events.subscribe();
        let medium = RemediationAction::new(
            "m",
            RemediationKind::FileModification,
            "a",
            RiskLevel::Medium,
        );
        let approval = low("p").requiring_approval();
        let mut result = result_with(vec![medium, approval]);

        let records = fx
            .coordinator
            .remediate(Uuid::new_v4(), &mut result, &RunContext::new(&fx.project), true)
            .await;

        assert!(records
            .iter()
            .all(|r| r.state == RemediationState::Skipped && r.backup_ref.is_none()));
        assert_eq!(fx.handler.apply_count(), 0);
        assert_eq!(fx.stats.snapshot().remediations_applied, 0);
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn handler_failure_is_reported_not_propagated() {
        let fx = fixture(RecordingHandler::failing(
            RemediationKind::FileModification,
            "disk full",
        ));
        let mut events = fx.events.subscribe();
        let mut result = result_with(vec![low("a1")]);

        let records = fx
            .coordinator
            .remediate(Uuid::new_v4(), &mut result, &RunContext::new(&fx.project), false)
            .await;

        assert_eq!(records[0].state, RemediationState::Failed);
        assert!(records[0].error.as_deref().unwrap().contains("disk full"));
        assert!(records[0].backup_ref.is_none());
        assert_eq!(fx.stats.snapshot().remediations_applied, 0);
        let names: Vec<_> = events.drain().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["autofix:failed"]);
    }

    #[tokio::test]
    async fn missing_handler_fails_the_action() {
        let fx = fixture(RecordingHandler::new(RemediationKind::FileModification));
        let action = RemediationAction::new(
            "dep",
            RemediationKind::DependencyUpdate,
            "Cargo.toml",
            RiskLevel::Low,
        );
        let mut result = result_with(vec![action]);

        let records = fx
            .coordinator
            .remediate(Uuid::new_v4(), &mut result, &RunContext::new(&fx.project), true)
            .await;

        assert_eq!(records[0].state, RemediationState::Failed);
        assert!(records[0].backup_ref.is_none());
    }

    #[tokio::test]
    async fn rollback_restores_backed_up_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("settings.json");
        std::fs::write(&target, "{\"debug\": true}").unwrap();
        let coordinator = RemediationCoordinator::new(
            HandlerSet::new().with(Arc::new(FileModificationHandler)),
            Arc::new(FsBackupStore::new(dir.path().join("backups"))),
            Arc::new(StatsTracker::new()),
            Arc::new(EventBus::new()),
        );
        let action = RemediationAction::new(
            "off",
            RemediationKind::FileModification,
            &target,
            RiskLevel::Low,
        )
        .with_changes(json!({"content": "{\"debug\": false}"}));
        let mut result = result_with(vec![action]);

        let records = coordinator
            .remediate(Uuid::new_v4(), &mut result, &RunContext::default(), true)
            .await;
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "{\"debug\": false}"
        );

        let backup_ref = records[0].backup_ref.clone().unwrap();
        coordinator.rollback(&backup_ref).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{\"debug\": true}");
    }
}
