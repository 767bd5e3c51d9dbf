//! Retry/healing policy tables and the deterministic healing decider.
//!
//! A [`PolicyTable`] maps an error classification to its retry budget,
//! action, cooldown, and reason. The [`HealingDecider`] consults the table
//! and the current retry count to produce RETRY or STOP — it never executes
//! anything. Unrecognized classifications fall back to the DEFAULT entry
//! (stop, no retry) rather than failing.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::decision::DecisionKind;

/// Deterministic action identifiers attached to decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealingAction {
    /// Place the call again after the cooldown.
    RetryCall,
    /// Re-INVITE the existing session.
    Reinvite,
    /// Renegotiate to a more robust codec.
    SwitchCodec,
    /// Switch channel to SMS.
    EscalateToSms,
    /// Record the failure and stop.
    LogAndStop,
    /// Admission denial: reject and log for SLA audit.
    RejectAndLog,
}

impl std::fmt::Display for HealingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetryCall => write!(f, "RETRY_CALL"),
            Self::Reinvite => write!(f, "REINVITE"),
            Self::SwitchCodec => write!(f, "SWITCH_CODEC"),
            Self::EscalateToSms => write!(f, "ESCALATE_TO_SMS"),
            Self::LogAndStop => write!(f, "LOG_AND_STOP"),
            Self::RejectAndLog => write!(f, "REJECT_AND_LOG"),
        }
    }
}

/// Policy for one error classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// Retry attempts allowed before the class stops retrying.
    pub max_retries: u32,
    /// Whether this class is retryable at all.
    pub retryable: bool,
    /// Action attached to the resulting decision.
    pub action: HealingAction,
    /// Advisory cooldown in seconds. Never enforced by the engine.
    pub cooldown_secs: u32,
    /// Human-readable reason.
    pub reason: String,
}

impl PolicyEntry {
    fn new(
        max_retries: u32,
        retryable: bool,
        action: HealingAction,
        cooldown_secs: u32,
        reason: &str,
    ) -> Self {
        Self {
            max_retries,
            retryable,
            action,
            cooldown_secs,
            reason: reason.to_string(),
        }
    }
}

/// Error classification → policy mapping with a DEFAULT fallback.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    entries: HashMap<String, PolicyEntry>,
    default: PolicyEntry,
}

/// Classification literal used when the event carries no usable reason.
pub const DEFAULT_CLASS: &str = "DEFAULT";

/// Classification forced when packet loss exceeds the override threshold.
pub const HIGH_LOSS_CLASS: &str = "RTP_LOSS_HIGH";

/// Error loading a policy table from disk.
#[derive(Debug, thiserror::Error)]
pub enum PolicyLoadError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse policy file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl PolicyTable {
    /// Built-in telecom healing policy matrix.
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            "NO_ANSWER".to_string(),
            PolicyEntry::new(2, true, HealingAction::RetryCall, 30, "No response"),
        );
        entries.insert(
            "BUSY".to_string(),
            PolicyEntry::new(0, false, HealingAction::EscalateToSms, 0, "Target busy"),
        );
        entries.insert(
            "SIP_TIMEOUT".to_string(),
            PolicyEntry::new(3, true, HealingAction::Reinvite, 10, "Timeout"),
        );
        entries.insert(
            "AUDIO_LOSS".to_string(),
            PolicyEntry::new(1, true, HealingAction::SwitchCodec, 0, "Audio issue"),
        );
        entries.insert(
            HIGH_LOSS_CLASS.to_string(),
            PolicyEntry::new(1, true, HealingAction::SwitchCodec, 0, "Poor quality network"),
        );
        Self::from_entries(entries)
    }

    /// Build a table from classification→entry pairs. A `DEFAULT` entry in
    /// the map becomes the fallback; otherwise the built-in fallback
    /// (stop, no retry, LOG_AND_STOP) is used.
    pub fn from_entries(mut entries: HashMap<String, PolicyEntry>) -> Self {
        let default = entries.remove(DEFAULT_CLASS).unwrap_or_else(|| {
            PolicyEntry::new(0, false, HealingAction::LogAndStop, 0, "Unknown")
        });
        Self { entries, default }
    }

    /// Load a table from a JSON file of classification→entry pairs.
    pub fn from_json_file(path: &Path) -> Result<Self, PolicyLoadError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: HashMap<String, PolicyEntry> = serde_json::from_str(&raw)?;
        Ok(Self::from_entries(entries))
    }

    /// Lookup by classification, falling back to DEFAULT. The input is
    /// expected to be already normalized (uppercase).
    pub fn lookup(&self, class: &str) -> &PolicyEntry {
        self.entries.get(class).unwrap_or(&self.default)
    }

    /// The fallback entry.
    pub fn default_entry(&self) -> &PolicyEntry {
        &self.default
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Outcome of the healing evaluation for one failure event.
#[derive(Debug, Clone)]
pub struct HealingOutcome {
    /// RETRY or STOP.
    pub decision: DecisionKind,
    /// Policy action for the caller to execute.
    pub action: HealingAction,
    /// Policy reason, suffixed with `(LIMIT_REACHED)` when the stop was
    /// caused by exceeding the retry budget rather than a non-retryable
    /// class.
    pub reason: String,
    /// Advisory cooldown in seconds.
    pub cooldown_secs: u32,
    /// The authoritative exhaustion signal, `retry_count >= max_retries`.
    /// The orchestrator's escalation override keys off it. Zero-budget
    /// classes (BUSY, DEFAULT) set it on their first failure.
    pub retries_exceeded: bool,
    /// Normalized classification the decision was made for.
    pub error_class: String,
}

/// Decides RETRY vs STOP for failure events. Pure policy evaluation — no
/// store access, no execution.
#[derive(Debug, Clone, Default)]
pub struct HealingDecider {
    table: PolicyTable,
}

impl HealingDecider {
    /// Decider over the given policy table.
    pub fn new(table: PolicyTable) -> Self {
        Self { table }
    }

    /// Evaluate a failure: classification (nullable, normalized to
    /// uppercase, DEFAULT when absent) against the current retry count.
    pub fn decide(&self, error_reason: Option<&str>, retry_count: u32) -> HealingOutcome {
        let class = error_reason
            .map(|reason| reason.trim().to_uppercase())
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| DEFAULT_CLASS.to_string());

        let policy = self.table.lookup(&class);
        let retries_exceeded = retry_count >= policy.max_retries;

        if !policy.retryable || retries_exceeded {
            let reason = if retries_exceeded {
                format!("{} (LIMIT_REACHED)", policy.reason)
            } else {
                policy.reason.clone()
            };
            HealingOutcome {
                decision: DecisionKind::Stop,
                action: policy.action,
                reason,
                cooldown_secs: policy.cooldown_secs,
                retries_exceeded,
                error_class: class,
            }
        } else {
            HealingOutcome {
                decision: DecisionKind::Retry,
                action: policy.action,
                reason: policy.reason.clone(),
                cooldown_secs: policy.cooldown_secs,
                retries_exceeded,
                error_class: class,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_answer_retries_then_stops() {
        let decider = HealingDecider::default();

        let first = decider.decide(Some("NO_ANSWER"), 0);
        assert_eq!(first.decision, DecisionKind::Retry);
        assert_eq!(first.action, HealingAction::RetryCall);
        assert_eq!(first.cooldown_secs, 30);
        assert!(!first.retries_exceeded);

        let exhausted = decider.decide(Some("NO_ANSWER"), 2);
        assert_eq!(exhausted.decision, DecisionKind::Stop);
        assert!(exhausted.retries_exceeded);
        assert_eq!(exhausted.reason, "No response (LIMIT_REACHED)");
    }

    #[test]
    fn test_busy_is_not_retryable() {
        let decider = HealingDecider::default();
        let outcome = decider.decide(Some("BUSY"), 0);
        assert_eq!(outcome.decision, DecisionKind::Stop);
        assert_eq!(outcome.action, HealingAction::EscalateToSms);
        // Zero budget: the very first failure already exhausts it.
        assert!(outcome.retries_exceeded);
        assert_eq!(outcome.reason, "Target busy (LIMIT_REACHED)");
    }

    #[test]
    fn test_classification_normalization() {
        let decider = HealingDecider::default();
        let outcome = decider.decide(Some(" no_answer "), 0);
        assert_eq!(outcome.error_class, "NO_ANSWER");
        assert_eq!(outcome.decision, DecisionKind::Retry);
    }

    #[test]
    fn test_missing_and_unknown_fall_back_to_default() {
        let decider = HealingDecider::default();

        let missing = decider.decide(None, 0);
        assert_eq!(missing.error_class, "DEFAULT");
        assert_eq!(missing.decision, DecisionKind::Stop);
        assert_eq!(missing.action, HealingAction::LogAndStop);

        let unknown = decider.decide(Some("CARRIER_EXPLODED"), 0);
        assert_eq!(unknown.error_class, "CARRIER_EXPLODED");
        assert_eq!(unknown.action, HealingAction::LogAndStop);
    }

    #[test]
    fn test_non_retryable_reason_has_no_limit_suffix() {
        // A non-retryable class with headroom left should carry the plain
        // reason, distinguishing it from budget exhaustion.
        let mut entries = HashMap::new();
        entries.insert(
            "BLOCKED".to_string(),
            PolicyEntry::new(5, false, HealingAction::LogAndStop, 0, "Blocked by carrier"),
        );
        let decider = HealingDecider::new(PolicyTable::from_entries(entries));

        let outcome = decider.decide(Some("BLOCKED"), 0);
        assert_eq!(outcome.decision, DecisionKind::Stop);
        assert_eq!(outcome.reason, "Blocked by carrier");
        assert!(!outcome.retries_exceeded);
    }

    #[test]
    fn test_table_json_round_trip() {
        let json = r#"{
            "NO_ANSWER": {"max_retries": 1, "retryable": true, "action": "RETRY_CALL", "cooldown_secs": 5, "reason": "No response"},
            "DEFAULT": {"max_retries": 0, "retryable": false, "action": "LOG_AND_STOP", "cooldown_secs": 0, "reason": "Unknown"}
        }"#;
        let entries: HashMap<String, PolicyEntry> = serde_json::from_str(json).unwrap();
        let table = PolicyTable::from_entries(entries);
        assert_eq!(table.lookup("NO_ANSWER").max_retries, 1);
        assert_eq!(table.lookup("ANYTHING").action, HealingAction::LogAndStop);
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!(
            serde_json::to_string(&HealingAction::EscalateToSms).unwrap(),
            "\"ESCALATE_TO_SMS\""
        );
        assert_eq!(HealingAction::RejectAndLog.to_string(), "REJECT_AND_LOG");
    }
}
