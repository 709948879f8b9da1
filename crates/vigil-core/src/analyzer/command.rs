//! Analyzer backed by an external process.
//!
//! Rule config: `{"command": ["prog", "arg", ...]}`. Exit code 0 passes with
//! score 1, anything else fails with score 0. When stdout is a JSON object it may
//! override `status`, `score`, `message`, `metrics` and `remediation_actions`.

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::Analyzer;
use crate::domain::{
    AnalyzerKind, RemediationAction, ResultStatus, Rule, RuleOutcome, RunContext,
};
use crate::error::AnalyzerError;

#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    kind: AnalyzerKind,
    alignment_bearing: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommandReport {
    status: Option<ResultStatus>,
    score: Option<f64>,
    message: Option<String>,
    metrics: BTreeMap<String, f64>,
    remediation_actions: Vec<RemediationAction>,
}

impl CommandAnalyzer {
    pub fn new(kind: AnalyzerKind) -> Self {
        Self {
            kind,
            alignment_bearing: false,
        }
    }

    pub fn with_alignment(mut self) -> Self {
        self.alignment_bearing = true;
        self
    }

    fn command_of(config: &serde_json::Value) -> Result<Vec<String>, AnalyzerError> {
        let items = config
            .get("command")
            .and_then(|c| c.as_array())
            .ok_or_else(|| AnalyzerError::InvalidConfig("missing 'command' array".into()))?;
        let command = items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    AnalyzerError::InvalidConfig("'command' entries must be strings".into())
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if command.is_empty() {
            return Err(AnalyzerError::InvalidConfig("'command' must not be empty".into()));
        }
        Ok(command)
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        self.kind
    }

    fn alignment_bearing(&self) -> bool {
        self.alignment_bearing
    }

    fn validate_rule_config(&self, config: &serde_json::Value) -> Result<(), AnalyzerError> {
        Self::command_of(config).map(|_| ())
    }

    async fn execute(
        &self,
        rule: &Rule,
        context: &RunContext,
    ) -> Result<RuleOutcome, AnalyzerError> {
        let command = Self::command_of(&rule.config)?;

        let mut cmd = Command::new(&command[0]);
        cmd.args(&command[1..])
            .env("VIGIL_RULE_ID", &rule.id)
            .env("VIGIL_ANALYZER", self.kind.as_str())
            .env("VIGIL_TARGET_FILES", context.target_files.join(":"))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !context.project_path.as_os_str().is_empty() {
            cmd.current_dir(&context.project_path);
        }

        let output = cmd.spawn()?.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(rule_id = %rule.id, exit = ?output.status.code(), "command analyzer finished");

        let (default_status, default_score, default_message) = if output.status.success() {
            (ResultStatus::Passed, 1.0, stdout.trim().to_string())
        } else {
            (
                ResultStatus::Failed,
                0.0,
                format!(
                    "exited with code {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            )
        };

        let report = serde_json::from_str::<CommandReport>(stdout.trim()).ok();
        let outcome = match report {
            Some(report) => RuleOutcome {
                status: report.status.unwrap_or(default_status),
                score: report.score.unwrap_or(default_score),
                message: report.message.unwrap_or(default_message),
                metrics: report.metrics,
                remediation_actions: report.remediation_actions,
            },
            None => RuleOutcome {
                status: default_status,
                score: default_score,
                message: default_message,
                metrics: BTreeMap::new(),
                remediation_actions: Vec::new(),
            },
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(command: serde_json::Value) -> Rule {
        Rule::new("cmd", AnalyzerKind::Architecture).with_config(json!({ "command": command }))
    }

    #[test]
    fn config_requires_non_empty_string_command() {
        let analyzer = CommandAnalyzer::new(AnalyzerKind::Architecture);
        assert!(analyzer.validate_rule_config(&json!({"command": ["true"]})).is_ok());
        assert!(analyzer.validate_rule_config(&json!({})).is_err());
        assert!(analyzer.validate_rule_config(&json!({"command": []})).is_err());
        assert!(analyzer.validate_rule_config(&json!({"command": [1, 2]})).is_err());
    }

    #[tokio::test]
    async fn zero_exit_passes() {
        let analyzer = CommandAnalyzer::new(AnalyzerKind::Architecture);
        let outcome = analyzer
            .execute(&rule(json!(["echo", "layering ok"])), &RunContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.status, ResultStatus::Passed);
        assert_eq!(outcome.score, 1.0);
        assert_eq!(outcome.message, "layering ok");
    }

    #[tokio::test]
    async fn non_zero_exit_fails_with_zero_score() {
        let analyzer = CommandAnalyzer::new(AnalyzerKind::Architecture);
        let outcome = analyzer
            .execute(&rule(json!(["false"])), &RunContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.status, ResultStatus::Failed);
        assert_eq!(outcome.score, 0.0);
    }

    #[tokio::test]
    async fn json_stdout_overrides_score_and_metrics() {
        let analyzer = CommandAnalyzer::new(AnalyzerKind::Philosophy).with_alignment();
        let report = r#"{"score": 0.4, "metrics": {"ayni": 0.5}, "message": "partial"}"#;
        let outcome = analyzer
            .execute(&rule(json!(["echo", report])), &RunContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.score, 0.4);
        assert_eq!(outcome.metrics["ayni"], 0.5);
        assert_eq!(outcome.message, "partial");
        assert!(analyzer.alignment_bearing());
    }

    #[test]
    fn alignment_is_opt_in() {
        let plain = CommandAnalyzer::new(AnalyzerKind::Philosophy);
        assert!(!plain.alignment_bearing());
        assert!(plain.with_alignment().alignment_bearing());
    }

    #[tokio::test]
    async fn missing_program_is_a_typed_error() {
        let analyzer = CommandAnalyzer::new(AnalyzerKind::Ux);
        let err = analyzer
            .execute(
                &rule(json!(["definitely-not-a-real-binary-vigil"])),
                &RunContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::Io(_)));
    }
}
