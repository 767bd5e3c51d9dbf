//! The decision record emitted for every processed event.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::lifecycle::CallLifecycle;
use crate::policy::HealingAction;
use crate::quality::QualityLabel;
use crate::sla::{SlaStatus, SlaViolation};

/// What the engine decided for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    /// Attempt the call again (failure with retry budget left).
    Retry,
    /// Give up on the voice call.
    Stop,
    /// The call completed.
    Success,
    /// Nothing to do for this event.
    NoAction,
    /// Admission denied; the caller should back off.
    Delay,
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retry => write!(f, "RETRY"),
            Self::Stop => write!(f, "STOP"),
            Self::Success => write!(f, "SUCCESS"),
            Self::NoAction => write!(f, "NO_ACTION"),
            Self::Delay => write!(f, "DELAY"),
        }
    }
}

/// Full decision payload for one event. This is the engine's only output;
/// it never executes retries, SMS sends, or codec switches itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub call_id: String,
    pub decision: DecisionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<HealingAction>,
    /// Advisory cooldown in seconds before the action should run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<u32>,
    /// Action parameters, open-ended per action.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<CallLifecycle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_quality: Option<QualityLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_status: Option<SlaStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<SlaViolation>,
}

impl DecisionRecord {
    /// A NO_ACTION record carrying only the reason.
    pub fn no_action(call_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            decision: DecisionKind::NoAction,
            reason: Some(reason.into()),
            action: None,
            cooldown: None,
            params: Map::new(),
            retry_count: None,
            current_state: None,
            voice_quality: None,
            score: None,
            sla_status: None,
            violations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_wire_names() {
        assert_eq!(
            serde_json::to_string(&DecisionKind::NoAction).unwrap(),
            "\"NO_ACTION\""
        );
        assert_eq!(DecisionKind::Delay.to_string(), "DELAY");
    }

    #[test]
    fn test_no_action_omits_empty_fields() {
        let record = DecisionRecord::no_action("c-1", "ALREADY_COMPLETED");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["decision"], "NO_ACTION");
        assert_eq!(json["reason"], "ALREADY_COMPLETED");
        assert!(json.get("action").is_none());
        assert!(json.get("params").is_none());
        assert!(json.get("violations").is_none());
    }
}
