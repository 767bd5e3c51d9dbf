//! Engine configuration.
//!
//! Defaults are production values; every knob can be overridden from the
//! environment. Unparseable values fall back to the default with a
//! warning rather than refusing to start.

use tracing::warn;

use crate::sla::SlaConfig;

/// Tunables for the decision engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL for call lifecycle records (and the terminal tombstone).
    pub call_state_ttl_secs: u64,
    /// TTL for the shared context bag.
    pub context_ttl_secs: u64,
    /// Maximum concurrently active calls.
    pub max_concurrency: i64,
    /// Packet loss percentage that overrides the error class to
    /// RTP_LOSS_HIGH.
    pub high_loss_threshold: f64,
    /// SLA window and thresholds.
    pub sla: SlaConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_state_ttl_secs: 3600,
            context_ttl_secs: 3600,
            max_concurrency: 3,
            high_loss_threshold: 10.0,
            sla: SlaConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(var = name, value = %raw, "unparseable value; using default");
                default
            }
        },
        Err(_) => default,
    }
}

impl EngineConfig {
    /// Load configuration from the environment over the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            call_state_ttl_secs: env_parse("CALL_STATE_TTL_SECONDS", defaults.call_state_ttl_secs),
            context_ttl_secs: env_parse("CONTEXT_TTL_SECONDS", defaults.context_ttl_secs),
            max_concurrency: env_parse("MAX_CONCURRENCY", defaults.max_concurrency),
            high_loss_threshold: env_parse(
                "RTP_LOSS_OVERRIDE_THRESHOLD",
                defaults.high_loss_threshold,
            ),
            sla: SlaConfig {
                window_secs: env_parse("SLA_WINDOW_SECONDS", defaults.sla.window_secs),
                success_rate_threshold: env_parse(
                    "SLA_SUCCESS_RATE_THRESHOLD",
                    defaults.sla.success_rate_threshold,
                ),
                recovery_time_threshold: env_parse(
                    "SLA_RECOVERY_TIME_THRESHOLD",
                    defaults.sla.recovery_time_threshold,
                ),
            },
        }
    }
}
