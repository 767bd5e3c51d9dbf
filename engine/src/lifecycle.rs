//! Call lifecycle state machine.
//!
//! The event→state mapping is a fixed table. COMPLETED is terminal; FAILED
//! is re-enterable — a failed call may keep receiving events until its
//! record expires.

use crate::event::EventKind;
use serde::{Deserialize, Serialize};

/// Lifecycle states of a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallLifecycle {
    /// Created on first contact, before any transition.
    Init,
    /// Call has been started and is ringing.
    Ringing,
    /// Callee picked up.
    Answered,
    /// Last event was a failure. Re-enterable.
    Failed,
    /// Terminal — no further decisions for this record.
    Completed,
}

impl CallLifecycle {
    /// Whether this state is terminal (protected from further decisions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for CallLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Ringing => write!(f, "RINGING"),
            Self::Answered => write!(f, "ANSWERED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Fixed event→state transition table.
pub fn next_state(kind: EventKind) -> CallLifecycle {
    match kind {
        EventKind::Started => CallLifecycle::Ringing,
        EventKind::Answered => CallLifecycle::Answered,
        EventKind::Failed => CallLifecycle::Failed,
        EventKind::Completed => CallLifecycle::Completed,
    }
}
