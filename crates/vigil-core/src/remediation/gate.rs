//! Risk gate and lifecycle transitions for remediation actions.

use serde::{Deserialize, Serialize};

use crate::domain::{RemediationAction, RemediationState, RiskLevel};

/// Why an action was not applied automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    RiskTooHigh(RiskLevel),
    RequiresApproval,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RiskTooHigh(level) => write!(f, "risk level {level} is above low"),
            Self::RequiresApproval => write!(f, "action requires approval"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Apply,
    Skip(SkipReason),
}

/// Only low-risk actions that do not ask for approval are applied unattended.
pub fn assess(action: &RemediationAction) -> GateDecision {
    match (action.risk_level, action.requires_approval) {
        (RiskLevel::Low, false) => GateDecision::Apply,
        (RiskLevel::Low, true) => GateDecision::Skip(SkipReason::RequiresApproval),
        (level, _) => GateDecision::Skip(SkipReason::RiskTooHigh(level)),
    }
}

/// Input to the lifecycle machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Skip,
    DispatchSucceeded,
    DispatchFailed,
}

/// `Proposed -> {Applied | Skipped | Failed}`. Terminal states accept nothing,
/// which is what makes an action consumable at most once.
pub fn transition(from: RemediationState, step: Step) -> Option<RemediationState> {
    match (from, step) {
        (RemediationState::Proposed, Step::Skip) => Some(RemediationState::Skipped),
        (RemediationState::Proposed, Step::DispatchSucceeded) => Some(RemediationState::Applied),
        (RemediationState::Proposed, Step::DispatchFailed) => Some(RemediationState::Failed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RemediationKind;

    fn action(risk: RiskLevel, approval: bool) -> RemediationAction {
        let mut a = RemediationAction::new("a", RemediationKind::ConfigChange, "x.toml", risk);
        a.requires_approval = approval;
        a
    }

    #[test]
    fn gate_matrix() {
        assert_eq!(assess(&action(RiskLevel::Low, false)), GateDecision::Apply);
        assert_eq!(
            assess(&action(RiskLevel::Low, true)),
            GateDecision::Skip(SkipReason::RequiresApproval)
        );
        assert_eq!(
            assess(&action(RiskLevel::Medium, false)),
            GateDecision::Skip(SkipReason::RiskTooHigh(RiskLevel::Medium))
        );
        assert_eq!(
            assess(&action(RiskLevel::High, true)),
            GateDecision::Skip(SkipReason::RiskTooHigh(RiskLevel::High))
        );
    }

    #[test]
    fn proposed_reaches_each_terminal_state() {
        assert_eq!(
            transition(RemediationState::Proposed, Step::Skip),
            Some(RemediationState::Skipped)
        );
        assert_eq!(
            transition(RemediationState::Proposed, Step::DispatchSucceeded),
            Some(RemediationState::Applied)
        );
        assert_eq!(
            transition(RemediationState::Proposed, Step::DispatchFailed),
            Some(RemediationState::Failed)
        );
    }

    #[test]
    fn terminal_states_reject_further_steps() {
        for state in [
            RemediationState::Applied,
            RemediationState::Skipped,
            RemediationState::Failed,
        ] {
            for step in [Step::Skip, Step::DispatchSucceeded, Step::DispatchFailed] {
                assert_eq!(transition(state, step), None);
            }
        }
    }
}
