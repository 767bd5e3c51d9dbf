//! Inbound call lifecycle events.
//!
//! The ingress adapter (webhook layer, out of scope here) normalizes
//! third-party payloads into [`CallEvent`]. The engine trusts nothing
//! beyond this shape: unknown event types and missing fields are handled
//! downstream as decisions, never as errors.

use serde::{Deserialize, Serialize};

/// Normalized call lifecycle event — the only input the engine consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    /// Globally unique call identifier (non-empty).
    pub call_id: String,
    /// Raw event type string; see [`EventKind::parse`].
    pub event_type: String,
    /// Error classification reported by the carrier (NO_ANSWER, BUSY, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// RTP packet loss percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtp_loss: Option<f64>,
    /// Jitter in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<u32>,
    /// End-to-end latency in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u32>,
    /// Unix timestamp (seconds) assigned by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl CallEvent {
    /// Minimal event with just an id and a type (tests and tooling).
    pub fn new(call_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            event_type: event_type.into(),
            error_reason: None,
            rtp_loss: None,
            jitter: None,
            latency_ms: None,
            timestamp: None,
        }
    }
}

/// Recognized lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Started,
    Answered,
    Failed,
    Completed,
}

impl EventKind {
    /// Parse a wire event type. Accepts both the bare form (`STARTED`) and
    /// the prefixed form some sources emit (`CALL_STARTED`). Returns `None`
    /// for anything unrecognized — the orchestrator turns that into a
    /// NO_ACTION decision rather than an error.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_uppercase();
        let bare = normalized.strip_prefix("CALL_").unwrap_or(&normalized);
        match bare {
            "STARTED" => Some(Self::Started),
            "ANSWERED" => Some(Self::Answered),
            "FAILED" => Some(Self::Failed),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "STARTED"),
            Self::Answered => write!(f, "ANSWERED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_and_prefixed() {
        assert_eq!(EventKind::parse("STARTED"), Some(EventKind::Started));
        assert_eq!(EventKind::parse("CALL_STARTED"), Some(EventKind::Started));
        assert_eq!(EventKind::parse("call_failed"), Some(EventKind::Failed));
        assert_eq!(EventKind::parse(" completed "), Some(EventKind::Completed));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(EventKind::parse("RINGING"), None);
        assert_eq!(EventKind::parse(""), None);
    }

    #[test]
    fn test_event_deserializes_sparse_payload() {
        let event: CallEvent =
            serde_json::from_str(r#"{"call_id":"c-1","event_type":"FAILED"}"#).unwrap();
        assert_eq!(event.call_id, "c-1");
        assert!(event.error_reason.is_none());
        assert!(event.rtp_loss.is_none());
    }

    #[test]
    fn test_event_kind_wire_names() {
        let json = serde_json::to_string(&EventKind::Completed).unwrap();
        assert_eq!(json, "\"COMPLETED\"");
    }
}
