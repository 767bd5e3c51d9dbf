//! Call Lifecycle Decision Engine
//!
//! Deterministic decision core for voice call healing:
//! - Lifecycle state machine over inbound call events
//! - Policy-driven retry/healing decisions with SMS escalation
//! - Admission control over a shared concurrency counter
//! - Voice quality scoring from RTP metrics
//! - Sliding-window SLA aggregation
//! - Shared per-call context with versioned, lock-free merges
//!
//! The engine decides; it never executes. Every processed event yields a
//! [`DecisionRecord`] naming the action for the surrounding telephony
//! stack to carry out.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use callflow::{CallEvent, EngineConfig, MemoryStore, Orchestrator};
//!
//! let store = Arc::new(MemoryStore::new());
//! let engine = Orchestrator::new(store, EngineConfig::default());
//!
//! let mut event = CallEvent::new("call-42", "CALL_FAILED");
//! event.error_reason = Some("NO_ANSWER".to_string());
//! let decision = engine.handle_event(&event);
//! println!("{}", serde_json::to_string(&decision).unwrap());
//! ```

pub mod admission;
pub mod composer;
pub mod config;
pub mod decision;
pub mod event;
pub mod lifecycle;
pub mod orchestrator;
pub mod policy;
pub mod quality;
pub mod sla;
pub mod store;
pub mod supervisor;

// Re-export key event and lifecycle types
pub use event::{CallEvent, EventKind};
pub use lifecycle::{next_state, CallLifecycle};

// Re-export key decision types
pub use decision::{DecisionKind, DecisionRecord};
pub use policy::{HealingAction, HealingDecider, HealingOutcome, PolicyEntry, PolicyTable};

// Re-export quality and SLA types
pub use quality::{score_quality, QualityLabel, QualityReport};
pub use sla::{SlaAggregator, SlaConfig, SlaReport, SlaStatus, SlaViolation};

// Re-export orchestration types
pub use admission::AdmissionController;
pub use composer::{ComposedDecision, DecisionComposer};
pub use config::EngineConfig;
pub use orchestrator::{Orchestrator, ESCALATION_REASON, LOAD_REJECTED_REASON};
pub use supervisor::{NoopAdvisor, RoutingAdvisor, RoutingHint};

// Re-export store types
pub use store::{
    merge_context, CallRecord, ContextMap, ContextSnapshot, DegradedStore, EngineStore,
    MemoryStore, StoreError, StoreResult,
};
#[cfg(feature = "durable-state")]
pub use store::RocksStore;
