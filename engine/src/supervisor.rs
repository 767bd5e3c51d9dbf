//! Routing advice seam.
//!
//! An advisor may suggest a routing target from the call's shared context.
//! Advice is strictly observational: it lands in the context as
//! `routing_hint` and never alters the composed decision. The default
//! advisor suggests nothing.

use serde::{Deserialize, Serialize};

use crate::store::ContextMap;

/// A suggested routing target with its rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingHint {
    pub target: String,
    pub rationale: String,
}

/// Supplies optional routing advice per event.
pub trait RoutingAdvisor: Send + Sync {
    /// Advise on the call given its current shared context, or decline.
    fn advise(&self, call_id: &str, context: &ContextMap) -> Option<RoutingHint>;
}

/// Advisor that never advises.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdvisor;

impl RoutingAdvisor for NoopAdvisor {
    fn advise(&self, _call_id: &str, _context: &ContextMap) -> Option<RoutingHint> {
        None
    }
}
