//! Event orchestration.
//!
//! One entry point, [`Orchestrator::handle_event`], drives the full
//! pipeline for a single event: admission, lifecycle lookup, decision
//! composition, escalation override, state transitions, and SLA
//! accounting. Store failures along the way degrade to safe defaults with
//! a warning; an event always yields a decision.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::admission::AdmissionController;
use crate::composer::DecisionComposer;
use crate::config::EngineConfig;
use crate::decision::{DecisionKind, DecisionRecord};
use crate::event::{CallEvent, EventKind};
use crate::lifecycle::{next_state, CallLifecycle};
use crate::policy::{HealingAction, HealingDecider, PolicyTable};
use crate::sla::{SlaAggregator, SlaReport};
use crate::store::keys::context_keys;
use crate::store::{merge_context, CallRecord, ContextMap, EngineStore};
use crate::supervisor::{NoopAdvisor, RoutingAdvisor};

/// Reason attached to admission denials.
pub const LOAD_REJECTED_REASON: &str =
    "System concurrency limit reached. Logging for SLA audit.";

/// Reason attached to SMS escalations.
pub const ESCALATION_REASON: &str =
    "Max retries exceeded for voice call. Switching to SMS channel.";

/// The decision engine's front door.
pub struct Orchestrator {
    store: Arc<dyn EngineStore>,
    admission: AdmissionController,
    composer: DecisionComposer,
    sla: SlaAggregator,
    advisor: Arc<dyn RoutingAdvisor>,
    config: EngineConfig,
}

impl Orchestrator {
    /// Orchestrator with the built-in policy table and no routing advisor.
    pub fn new(store: Arc<dyn EngineStore>, config: EngineConfig) -> Self {
        Self::with_policy(store, config, PolicyTable::builtin())
    }

    /// Orchestrator with a caller-supplied policy table.
    pub fn with_policy(
        store: Arc<dyn EngineStore>,
        config: EngineConfig,
        table: PolicyTable,
    ) -> Self {
        let admission = AdmissionController::new(store.clone(), config.max_concurrency);
        let composer = DecisionComposer::new(
            HealingDecider::new(table),
            config.high_loss_threshold,
            config.context_ttl_secs,
        );
        let sla = SlaAggregator::new(store.clone(), config.sla.clone());
        Self {
            store,
            admission,
            composer,
            sla,
            advisor: Arc::new(NoopAdvisor),
            config,
        }
    }

    /// Replace the routing advisor.
    pub fn with_advisor(mut self, advisor: Arc<dyn RoutingAdvisor>) -> Self {
        self.advisor = advisor;
        self
    }

    /// Process one event end to end and return the decision. Never fails:
    /// malformed input and store trouble both degrade to a decision.
    pub fn handle_event(&self, event: &CallEvent) -> DecisionRecord {
        if event.call_id.trim().is_empty() {
            return DecisionRecord::no_action(event.call_id.clone(), "MISSING_CALL_ID");
        }

        let mut orchestration_ctx = ContextMap::new();
        orchestration_ctx.insert(context_keys::CURRENT_TASK.into(), json!("ORCHESTRATE"));
        orchestration_ctx.insert(context_keys::EVENT_TYPE.into(), json!(event.event_type));
        merge_context(
            self.store.as_ref(),
            &event.call_id,
            orchestration_ctx,
            self.config.context_ttl_secs,
        );

        let kind = EventKind::parse(&event.event_type);

        if kind == Some(EventKind::Started) {
            if let Some(rejection) = self.admit(event) {
                return rejection;
            }
        }

        let record = match self
            .store
            .init_call_if_missing(&event.call_id, self.config.call_state_ttl_secs)
        {
            Ok(record) => record,
            Err(err) => {
                warn!(call_id = %event.call_id, error = %err, "call record unavailable; assuming fresh call");
                CallRecord::fresh()
            }
        };

        let kind = match kind {
            Some(kind) => kind,
            None => {
                warn!(call_id = %event.call_id, event_type = %event.event_type, "unrecognized event type");
                let mut decision = DecisionRecord::no_action(event.call_id.clone(), "UNKNOWN_EVENT");
                decision.current_state = Some(record.state);
                return decision;
            }
        };

        // Terminal protection: a completed call ignores every later event
        // until its record expires.
        if record.state.is_terminal() {
            // A duplicate START was already admitted above; hand the slot
            // back before short-circuiting or it stays consumed forever.
            if kind == EventKind::Started {
                if let Err(err) = self.admission.release() {
                    warn!(call_id = %event.call_id, error = %err, "slot release failed");
                }
            }
            let mut decision =
                DecisionRecord::no_action(event.call_id.clone(), "ALREADY_COMPLETED");
            decision.current_state = Some(record.state);
            return decision;
        }

        let mut composed =
            self.composer
                .compose(self.store.as_ref(), event, kind, record.retry_count);

        self.advise(event);

        // Escalation: a stop caused by retry exhaustion switches channel.
        if composed.decision == DecisionKind::Stop && composed.retries_exceeded {
            composed.action = Some(HealingAction::EscalateToSms);
            composed.reason = Some(ESCALATION_REASON.to_string());

            let mut escalation_ctx = ContextMap::new();
            escalation_ctx.insert(context_keys::ESCALATION_TRIGGERED.into(), json!(true));
            escalation_ctx.insert(context_keys::ESCALATION_TYPE.into(), json!("SMS_FALLBACK"));
            escalation_ctx.insert(
                context_keys::FINAL_VOICE_STATE.into(),
                json!(CallLifecycle::Failed.to_string()),
            );
            merge_context(
                self.store.as_ref(),
                &event.call_id,
                escalation_ctx,
                self.config.context_ttl_secs,
            );
        }

        let next = next_state(kind);

        // The retry counter moves only when the verdict is RETRY, so it can
        // never pass the policy's budget.
        let retry_count = if kind == EventKind::Failed && composed.decision == DecisionKind::Retry
        {
            match self
                .store
                .increment_retry(&event.call_id, self.config.call_state_ttl_secs)
            {
                Ok(count) => count,
                Err(err) => {
                    warn!(call_id = %event.call_id, error = %err, "retry increment failed");
                    record.retry_count + 1
                }
            }
        } else {
            record.retry_count
        };

        if let Err(err) = self.store.update_call(
            &event.call_id,
            Some(next),
            None,
            self.config.call_state_ttl_secs,
        ) {
            warn!(call_id = %event.call_id, error = %err, "state transition not persisted");
        }

        // Terminal events record an outcome sample; everything else still
        // reports the current window verdict.
        let sla_report = if matches!(kind, EventKind::Failed | EventKind::Completed) {
            if let Err(err) = self.admission.release() {
                warn!(call_id = %event.call_id, error = %err, "slot release failed");
            }
            let recovery = if composed.decision == DecisionKind::Retry {
                composed.cooldown_secs.map(f64::from)
            } else {
                None
            };
            self.sla.record(kind == EventKind::Completed, recovery)
        } else {
            self.sla.status()
        };

        let decision = DecisionRecord {
            call_id: event.call_id.clone(),
            decision: composed.decision,
            reason: composed.reason,
            action: composed.action,
            cooldown: composed.cooldown_secs,
            params: composed.params,
            retry_count: Some(retry_count),
            current_state: Some(next),
            voice_quality: Some(composed.quality.label),
            score: Some(composed.quality.score),
            sla_status: Some(sla_report.sla_status),
            violations: sla_report.violations,
        };

        info!(
            call_id = %decision.call_id,
            decision = %decision.decision,
            state = %next,
            retry_count,
            "decision"
        );
        decision
    }

    /// Current SLA verdict without recording anything.
    pub fn sla_status(&self) -> SlaReport {
        self.sla.status()
    }

    /// Admission gate for a starting call. Returns the rejection decision
    /// when the system is at capacity.
    fn admit(&self, event: &CallEvent) -> Option<DecisionRecord> {
        let admitted = match self.admission.try_acquire() {
            Ok(admitted) => admitted,
            Err(err) => {
                // Fail open: a broken counter must not stop call traffic.
                warn!(call_id = %event.call_id, error = %err, "admission counter unavailable; admitting");
                true
            }
        };

        if admitted {
            let mut load_ctx = ContextMap::new();
            if let Ok(active) = self.admission.active_calls() {
                load_ctx.insert(context_keys::ACTIVE_CALLS.into(), json!(active));
            }
            load_ctx.insert(
                context_keys::CONCURRENCY_LIMIT.into(),
                json!(self.admission.max_concurrency()),
            );
            load_ctx.insert(context_keys::LOAD_LEVEL.into(), json!("NORMAL"));
            merge_context(
                self.store.as_ref(),
                &event.call_id,
                load_ctx,
                self.config.context_ttl_secs,
            );
            return None;
        }

        warn!(call_id = %event.call_id, "call rejected at admission");
        let mut rejection_ctx = ContextMap::new();
        rejection_ctx.insert(context_keys::LOAD_REJECTED.into(), json!(true));
        rejection_ctx.insert(context_keys::SLA_IMPACT.into(), json!("POTENTIAL_BREACH"));
        rejection_ctx.insert(context_keys::LOAD_LEVEL.into(), json!("OVERLOAD"));
        merge_context(
            self.store.as_ref(),
            &event.call_id,
            rejection_ctx,
            self.config.context_ttl_secs,
        );

        let report = self.sla.status();
        let mut decision = DecisionRecord::no_action(event.call_id.clone(), LOAD_REJECTED_REASON);
        decision.decision = DecisionKind::Delay;
        decision.action = Some(HealingAction::RejectAndLog);
        decision.retry_count = Some(0);
        decision.sla_status = Some(report.sla_status);
        decision.violations = report.violations;
        Some(decision)
    }

    /// Ask the advisor for a routing hint and publish it.
    fn advise(&self, event: &CallEvent) {
        let context = match self.store.context_get(&event.call_id) {
            Ok(snapshot) => snapshot.values,
            Err(err) => {
                warn!(call_id = %event.call_id, error = %err, "context unavailable for advisor");
                ContextMap::new()
            }
        };
        if let Some(hint) = self.advisor.advise(&event.call_id, &context) {
            let mut hint_ctx = ContextMap::new();
            match serde_json::to_value(&hint) {
                Ok(value) => {
                    hint_ctx.insert(context_keys::ROUTING_HINT.into(), value);
                    merge_context(
                        self.store.as_ref(),
                        &event.call_id,
                        hint_ctx,
                        self.config.context_ttl_secs,
                    );
                }
                Err(err) => {
                    warn!(call_id = %event.call_id, error = %err, "routing hint not serializable");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::supervisor::RoutingHint;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Arc::new(MemoryStore::new()), EngineConfig::default())
    }

    fn failed(call_id: &str, reason: &str) -> CallEvent {
        let mut event = CallEvent::new(call_id, "CALL_FAILED");
        event.error_reason = Some(reason.to_string());
        event
    }

    #[test]
    fn test_missing_call_id_is_rejected_early() {
        let engine = orchestrator();
        let decision = engine.handle_event(&CallEvent::new("", "CALL_STARTED"));
        assert_eq!(decision.decision, DecisionKind::NoAction);
        assert_eq!(decision.reason.as_deref(), Some("MISSING_CALL_ID"));
    }

    #[test]
    fn test_started_event_rings_the_call() {
        let engine = orchestrator();
        let decision = engine.handle_event(&CallEvent::new("c-1", "CALL_STARTED"));
        assert_eq!(decision.decision, DecisionKind::NoAction);
        assert_eq!(decision.current_state, Some(CallLifecycle::Ringing));
        assert_eq!(decision.retry_count, Some(0));
    }

    #[test]
    fn test_unknown_event_leaves_state_alone() {
        let engine = orchestrator();
        engine.handle_event(&CallEvent::new("c-2", "CALL_STARTED"));
        let decision = engine.handle_event(&CallEvent::new("c-2", "CARRIER_PIGEON"));
        assert_eq!(decision.reason.as_deref(), Some("UNKNOWN_EVENT"));
        assert_eq!(decision.current_state, Some(CallLifecycle::Ringing));
    }

    #[test]
    fn test_terminal_call_ignores_later_events() {
        let engine = orchestrator();
        engine.handle_event(&CallEvent::new("c-3", "CALL_STARTED"));
        engine.handle_event(&CallEvent::new("c-3", "CALL_COMPLETED"));

        let late = engine.handle_event(&failed("c-3", "NO_ANSWER"));
        assert_eq!(late.decision, DecisionKind::NoAction);
        assert_eq!(late.reason.as_deref(), Some("ALREADY_COMPLETED"));
    }

    #[test]
    fn test_retry_budget_drives_escalation() {
        let engine = orchestrator();
        engine.handle_event(&CallEvent::new("c-4", "CALL_STARTED"));

        let first = engine.handle_event(&failed("c-4", "NO_ANSWER"));
        assert_eq!(first.decision, DecisionKind::Retry);
        assert_eq!(first.retry_count, Some(1));

        let second = engine.handle_event(&failed("c-4", "NO_ANSWER"));
        assert_eq!(second.decision, DecisionKind::Retry);
        assert_eq!(second.retry_count, Some(2));

        let third = engine.handle_event(&failed("c-4", "NO_ANSWER"));
        assert_eq!(third.decision, DecisionKind::Stop);
        assert_eq!(third.action, Some(HealingAction::EscalateToSms));
        assert_eq!(third.reason.as_deref(), Some(ESCALATION_REASON));
        // Counter stops at the budget.
        assert_eq!(third.retry_count, Some(2));
    }

    #[test]
    fn test_advisor_hint_lands_in_context() {
        struct StaticAdvisor;
        impl RoutingAdvisor for StaticAdvisor {
            fn advise(&self, _call_id: &str, _context: &ContextMap) -> Option<RoutingHint> {
                Some(RoutingHint {
                    target: "trunk_b".to_string(),
                    rationale: "primary trunk congested".to_string(),
                })
            }
        }

        let store = Arc::new(MemoryStore::new());
        let engine = Orchestrator::new(store.clone(), EngineConfig::default())
            .with_advisor(Arc::new(StaticAdvisor));
        engine.handle_event(&CallEvent::new("c-5", "CALL_STARTED"));

        let ctx = store.context_get("c-5").unwrap();
        assert_eq!(ctx.values["routing_hint"]["target"], "trunk_b");
    }

    #[test]
    fn test_broken_store_still_yields_decisions() {
        use crate::store::DegradedStore;

        struct DownStore;
        impl EngineStore for DownStore {
            fn get_call(&self, _: &str) -> crate::store::StoreResult<Option<CallRecord>> {
                Err(crate::store::StoreError::Backend("down".into()))
            }
            fn init_call_if_missing(
                &self,
                _: &str,
                _: u64,
            ) -> crate::store::StoreResult<CallRecord> {
                Err(crate::store::StoreError::Backend("down".into()))
            }
            fn update_call(
                &self,
                _: &str,
                _: Option<CallLifecycle>,
                _: Option<u32>,
                _: u64,
            ) -> crate::store::StoreResult<()> {
                Err(crate::store::StoreError::Backend("down".into()))
            }
            fn increment_retry(&self, _: &str, _: u64) -> crate::store::StoreResult<u32> {
                Err(crate::store::StoreError::Backend("down".into()))
            }
            fn context_get(&self, _: &str) -> crate::store::StoreResult<crate::store::ContextSnapshot> {
                Err(crate::store::StoreError::Backend("down".into()))
            }
            fn context_put_if_version(
                &self,
                _: &str,
                _: u64,
                _: ContextMap,
                _: u64,
            ) -> crate::store::StoreResult<bool> {
                Err(crate::store::StoreError::Backend("down".into()))
            }
            fn counter_incr(&self, _: &str) -> crate::store::StoreResult<i64> {
                Err(crate::store::StoreError::Backend("down".into()))
            }
            fn counter_decr(&self, _: &str) -> crate::store::StoreResult<i64> {
                Err(crate::store::StoreError::Backend("down".into()))
            }
            fn counter_get(&self, _: &str) -> crate::store::StoreResult<i64> {
                Err(crate::store::StoreError::Backend("down".into()))
            }
            fn push_sample(&self, _: &str, _: f64, _: f64, _: u64) -> crate::store::StoreResult<()> {
                Err(crate::store::StoreError::Backend("down".into()))
            }
            fn samples_since(&self, _: &str, _: f64) -> crate::store::StoreResult<Vec<f64>> {
                Err(crate::store::StoreError::Backend("down".into()))
            }
        }

        let store = Arc::new(DegradedStore::new(DownStore));
        let engine = Orchestrator::new(store, EngineConfig::default());

        let decision = engine.handle_event(&failed("c-6", "NO_ANSWER"));
        assert_eq!(decision.decision, DecisionKind::Retry);
    }
}
