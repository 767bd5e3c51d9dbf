//! Per-event decision composition.
//!
//! Scores quality, runs the healing policy for failures, and publishes the
//! observability keys each stage owns into the shared context. Side
//! effects on the call record (retry increments, state transitions) stay
//! with the orchestrator.

use serde_json::{json, Map, Value};

use crate::decision::DecisionKind;
use crate::event::{CallEvent, EventKind};
use crate::policy::{HealingAction, HealingDecider, HIGH_LOSS_CLASS};
use crate::quality::{score_quality, QualityReport};
use crate::store::keys::context_keys;
use crate::store::{merge_context, ContextMap, EngineStore};

/// Composed verdict for one event, before side effects.
#[derive(Debug, Clone)]
pub struct ComposedDecision {
    pub decision: DecisionKind,
    pub action: Option<HealingAction>,
    pub reason: Option<String>,
    pub cooldown_secs: Option<u32>,
    pub params: Map<String, Value>,
    /// Carried through from the healing outcome; drives escalation.
    pub retries_exceeded: bool,
    pub quality: QualityReport,
}

/// Composes quality scoring and healing policy into one verdict.
pub struct DecisionComposer {
    decider: HealingDecider,
    /// Packet loss percentage above which the reported error class is
    /// overridden to RTP_LOSS_HIGH.
    high_loss_threshold: f64,
    context_ttl: u64,
}

impl DecisionComposer {
    pub fn new(decider: HealingDecider, high_loss_threshold: f64, context_ttl: u64) -> Self {
        Self {
            decider,
            high_loss_threshold,
            context_ttl,
        }
    }

    /// Compose the verdict for a recognized event against the call's
    /// current retry count.
    pub fn compose(
        &self,
        store: &dyn EngineStore,
        event: &CallEvent,
        kind: EventKind,
        retry_count: u32,
    ) -> ComposedDecision {
        let quality = score_quality(event.rtp_loss, event.jitter);

        // Absent metrics are published as the scored defaults, matching the
        // values the score was computed from.
        let mut quality_ctx = ContextMap::new();
        quality_ctx.insert(
            context_keys::RTP_LOSS.into(),
            json!(event.rtp_loss.unwrap_or(0.0)),
        );
        quality_ctx.insert(
            context_keys::JITTER.into(),
            json!(event.jitter.unwrap_or(0)),
        );
        quality_ctx.insert(context_keys::QUALITY_SCORE.into(), json!(quality.score));
        quality_ctx.insert(
            context_keys::VOICE_QUALITY.into(),
            json!(quality.label.to_string()),
        );
        merge_context(store, &event.call_id, quality_ctx, self.context_ttl);

        match kind {
            EventKind::Completed => ComposedDecision {
                decision: DecisionKind::Success,
                action: None,
                reason: Some("Success".to_string()),
                cooldown_secs: None,
                params: Map::new(),
                retries_exceeded: false,
                quality,
            },
            EventKind::Failed => self.compose_failure(store, event, retry_count, quality),
            EventKind::Started | EventKind::Answered => ComposedDecision {
                decision: DecisionKind::NoAction,
                action: None,
                reason: None,
                cooldown_secs: None,
                params: Map::new(),
                retries_exceeded: false,
                quality,
            },
        }
    }

    fn compose_failure(
        &self,
        store: &dyn EngineStore,
        event: &CallEvent,
        retry_count: u32,
        quality: QualityReport,
    ) -> ComposedDecision {
        // Measured loss above the threshold overrides whatever reason the
        // event reported.
        let high_loss = event
            .rtp_loss
            .map(|loss| loss > self.high_loss_threshold)
            .unwrap_or(false);
        let error_reason = if high_loss {
            Some(HIGH_LOSS_CLASS)
        } else {
            event.error_reason.as_deref()
        };

        let outcome = self.decider.decide(error_reason, retry_count);

        let mut healing_ctx = ContextMap::new();
        healing_ctx.insert(context_keys::ERROR_CODE.into(), json!(outcome.error_class));
        healing_ctx.insert(context_keys::RETRY_COUNT.into(), json!(retry_count));
        healing_ctx.insert(
            context_keys::RETRIES_EXCEEDED.into(),
            json!(outcome.retries_exceeded),
        );
        healing_ctx.insert(
            context_keys::LAST_ACTION.into(),
            json!(outcome.action.to_string()),
        );
        merge_context(store, &event.call_id, healing_ctx, self.context_ttl);

        ComposedDecision {
            decision: outcome.decision,
            action: Some(outcome.action),
            reason: Some(outcome.reason),
            cooldown_secs: Some(outcome.cooldown_secs),
            params: Map::new(),
            retries_exceeded: outcome.retries_exceeded,
            quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyTable;
    use crate::quality::QualityLabel;
    use crate::store::MemoryStore;

    fn composer() -> DecisionComposer {
        DecisionComposer::new(HealingDecider::new(PolicyTable::builtin()), 10.0, 60)
    }

    #[test]
    fn test_completed_composes_success() {
        let store = MemoryStore::new();
        let event = CallEvent::new("c-1", "CALL_COMPLETED");
        let composed = composer().compose(&store, &event, EventKind::Completed, 0);
        assert_eq!(composed.decision, DecisionKind::Success);
        assert_eq!(composed.reason.as_deref(), Some("Success"));
        assert_eq!(composed.quality.score, 1.0);
    }

    #[test]
    fn test_failure_consults_policy() {
        let store = MemoryStore::new();
        let mut event = CallEvent::new("c-2", "CALL_FAILED");
        event.error_reason = Some("NO_ANSWER".to_string());

        let composed = composer().compose(&store, &event, EventKind::Failed, 0);
        assert_eq!(composed.decision, DecisionKind::Retry);
        assert_eq!(composed.action, Some(HealingAction::RetryCall));
        assert_eq!(composed.cooldown_secs, Some(30));
    }

    #[test]
    fn test_high_loss_overrides_reported_reason() {
        let store = MemoryStore::new();
        let mut event = CallEvent::new("c-3", "CALL_FAILED");
        event.error_reason = Some("NO_ANSWER".to_string());
        event.rtp_loss = Some(15.0);

        let composed = composer().compose(&store, &event, EventKind::Failed, 0);
        // RTP_LOSS_HIGH policy: switch codec rather than redial.
        assert_eq!(composed.action, Some(HealingAction::SwitchCodec));
        assert_eq!(composed.quality.label, QualityLabel::Poor);
        assert_eq!(composed.quality.score, 0.5);

        let ctx = store.context_get("c-3").unwrap();
        assert_eq!(ctx.values["error_code"], "RTP_LOSS_HIGH");
    }

    #[test]
    fn test_loss_at_threshold_keeps_reported_reason() {
        let store = MemoryStore::new();
        let mut event = CallEvent::new("c-4", "CALL_FAILED");
        event.error_reason = Some("SIP_TIMEOUT".to_string());
        event.rtp_loss = Some(10.0);

        let composed = composer().compose(&store, &event, EventKind::Failed, 0);
        assert_eq!(composed.action, Some(HealingAction::Reinvite));
    }

    #[test]
    fn test_quality_published_to_context() {
        let store = MemoryStore::new();
        let mut event = CallEvent::new("c-5", "ANSWERED");
        event.rtp_loss = Some(2.0);
        event.jitter = Some(10);

        let composed = composer().compose(&store, &event, EventKind::Answered, 0);
        assert_eq!(composed.decision, DecisionKind::NoAction);

        let ctx = store.context_get("c-5").unwrap();
        assert_eq!(ctx.values["quality_score"], 0.78);
        assert_eq!(ctx.values["voice_quality"], "OK");
        assert_eq!(ctx.values["rtp_loss"], 2.0);
    }

    #[test]
    fn test_unmeasured_metrics_publish_as_defaults() {
        let store = MemoryStore::new();
        let event = CallEvent::new("c-6", "ANSWERED");

        composer().compose(&store, &event, EventKind::Answered, 0);

        let ctx = store.context_get("c-6").unwrap();
        assert_eq!(ctx.values["rtp_loss"], 0.0);
        assert_eq!(ctx.values["jitter"], 0);
        assert_eq!(ctx.values["quality_score"], 1.0);
    }
}
