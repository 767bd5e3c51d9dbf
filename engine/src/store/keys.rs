//! Key namespace shared by all store backends.
//!
//! One logical keyspace regardless of backend: `call:{id}` for lifecycle
//! records, `team_state:{id}` for the shared context bag,
//! `sla:window:{metric}` for window samples, and `load:active_calls` for
//! the admission counter.

/// Key for a call lifecycle record.
pub fn call(call_id: &str) -> String {
    format!("call:{}", call_id)
}

/// Key for a call's shared context bag.
pub fn context(call_id: &str) -> String {
    format!("team_state:{}", call_id)
}

/// Key for a sliding-window metric series.
pub fn sla_window(metric: &str) -> String {
    format!("sla:window:{}", metric)
}

/// Global in-flight call counter used by admission control.
pub const ACTIVE_CALLS: &str = "load:active_calls";

/// Recognized shared-context keys, by writer.
///
/// Any component may write arbitrary keys; these are the ones the engine
/// itself emits. All of them are observability only.
pub mod context_keys {
    // Orchestrator
    pub const CURRENT_TASK: &str = "current_task";
    pub const EVENT_TYPE: &str = "event_type";
    pub const ROUTING_HINT: &str = "routing_hint";
    pub const LOAD_REJECTED: &str = "load_rejected";
    pub const SLA_IMPACT: &str = "sla_impact";
    pub const ESCALATION_TRIGGERED: &str = "escalation_triggered";
    pub const ESCALATION_TYPE: &str = "escalation_type";
    pub const FINAL_VOICE_STATE: &str = "final_voice_state";

    // Healing decider
    pub const ERROR_CODE: &str = "error_code";
    pub const RETRY_COUNT: &str = "retry_count";
    pub const RETRIES_EXCEEDED: &str = "retries_exceeded";
    pub const LAST_ACTION: &str = "last_action";

    // Voice quality scorer
    pub const RTP_LOSS: &str = "rtp_loss";
    pub const JITTER: &str = "jitter";
    pub const QUALITY_SCORE: &str = "quality_score";
    pub const VOICE_QUALITY: &str = "voice_quality";

    // Admission controller
    pub const ACTIVE_CALLS: &str = "active_calls";
    pub const CONCURRENCY_LIMIT: &str = "concurrency_limit";
    pub const LOAD_LEVEL: &str = "load_level";
}
