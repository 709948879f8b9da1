//! In-memory fakes for the engine's collaborators (testing only)
//!
//! Provides `ScriptedAnalyzer`, `RecordingHandler` and `RecordingScheduler`,
//! which satisfy the collaborator traits without touching processes or disks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::analyzer::Analyzer;
use crate::domain::{
    AnalyzerKind, Pipeline, PipelineId, RemediationAction, RemediationKind, Rule, RuleOutcome,
    RunContext,
};
use crate::error::{AnalyzerError, RemediationError};
use crate::remediation::RemediationHandler;
use crate::scheduler::PipelineScheduler;

// ---------------------------------------------------------------------------
// ScriptedAnalyzer
// ---------------------------------------------------------------------------

/// What a scripted rule does when executed.
#[derive(Debug, Clone)]
pub enum Script {
    Outcome(RuleOutcome),
    Fail(String),
    Panic,
}

/// Analyzer whose behaviour is scripted per rule id.
///
/// Unscripted rules pass with score 1. Tracks call order and peak concurrency.
#[derive(Debug)]
pub struct ScriptedAnalyzer {
    kind: AnalyzerKind,
    alignment_bearing: bool,
    delay: Option<Duration>,
    rejected_config_key: Option<String>,
    scripts: Mutex<HashMap<String, (Script, Option<Duration>)>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub fn new(kind: AnalyzerKind) -> Self {
        Self {
            kind,
            alignment_bearing: false,
            delay: None,
            rejected_config_key: None,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_alignment(mut self) -> Self {
        self.alignment_bearing = true;
        self
    }

    /// Delay applied to every call without its own delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject rule configs that contain `key` at registration time.
    pub fn rejecting_config_key(mut self, key: impl Into<String>) -> Self {
        self.rejected_config_key = Some(key.into());
        self
    }

    pub fn script(self, rule_id: impl Into<String>, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(rule_id.into(), (script, None));
        self
    }

    pub fn script_delayed(
        self,
        rule_id: impl Into<String>,
        script: Script,
        delay: Duration,
    ) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(rule_id.into(), (script, Some(delay)));
        self
    }

    pub fn outcome(self, rule_id: impl Into<String>, outcome: RuleOutcome) -> Self {
        self.script(rule_id, Script::Outcome(outcome))
    }

    /// Rule ids in the order they were executed.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of simultaneous `execute` calls observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        self.kind
    }

    fn alignment_bearing(&self) -> bool {
        self.alignment_bearing
    }

    fn validate_rule_config(&self, config: &serde_json::Value) -> Result<(), AnalyzerError> {
        match &self.rejected_config_key {
            Some(key) if config.get(key).is_some() => Err(AnalyzerError::InvalidConfig(format!(
                "'{key}' is not a recognised option"
            ))),
            _ => Ok(()),
        }
    }

    async fn execute(
        &self,
        rule: &Rule,
        _context: &RunContext,
    ) -> Result<RuleOutcome, AnalyzerError> {
        self.calls.lock().unwrap().push(rule.id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let (script, delay) = self
            .scripts
            .lock()
            .unwrap()
            .get(&rule.id)
            .cloned()
            .unwrap_or((Script::Outcome(RuleOutcome::passed(1.0, "ok")), None));

        if let Some(delay) = delay.or(self.delay) {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match script {
            Script::Outcome(outcome) => Ok(outcome),
            Script::Fail(msg) => Err(AnalyzerError::Failed(msg)),
            Script::Panic => panic!("scripted panic in rule {}", rule.id),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingHandler
// ---------------------------------------------------------------------------

/// Remediation handler that records every action it is asked to apply.
#[derive(Debug)]
pub struct RecordingHandler {
    kind: RemediationKind,
    fail_with: Option<String>,
    applied: Mutex<Vec<RemediationAction>>,
}

impl RecordingHandler {
    pub fn new(kind: RemediationKind) -> Self {
        Self {
            kind,
            fail_with: None,
            applied: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: RemediationKind, message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::new(kind)
        }
    }

    pub fn applied(&self) -> Vec<RemediationAction> {
        self.applied.lock().unwrap().clone()
    }

    pub fn apply_count(&self) -> usize {
        self.applied.lock().unwrap().len()
    }
}

#[async_trait]
impl RemediationHandler for RecordingHandler {
    fn kind(&self) -> RemediationKind {
        self.kind
    }

    async fn apply(&self, action: &RemediationAction) -> Result<(), RemediationError> {
        if let Some(msg) = &self.fail_with {
            return Err(RemediationError::Handler(msg.clone()));
        }
        self.applied.lock().unwrap().push(action.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingScheduler
// ---------------------------------------------------------------------------

/// Scheduler that remembers which pipelines were handed to it.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<(PipelineId, String)>>,
    unscheduled: Mutex<Vec<PipelineId>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<(PipelineId, String)> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn unscheduled(&self) -> Vec<PipelineId> {
        self.unscheduled.lock().unwrap().clone()
    }
}

impl PipelineScheduler for RecordingScheduler {
    fn schedule(&self, pipeline: &Pipeline, expression: &str) {
        self.scheduled
            .lock()
            .unwrap()
            .push((pipeline.id, expression.to_string()));
    }

    fn unschedule(&self, pipeline_id: PipelineId) {
        self.unscheduled.lock().unwrap().push(pipeline_id);
    }
}
