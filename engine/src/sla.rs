//! Sliding-window SLA aggregation.
//!
//! Two metric series are kept: a 0/1 success flag per finished call and a
//! recovery-time sample per healed failure. Status is evaluated over the
//! configured window on every record. Store failures degrade to SLA_OK
//! with a warning; aggregation is advisory and must never block the
//! decision path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::{unix_now_f64, EngineStore};

/// Series name for the per-call success flag.
pub const METRIC_SUCCESS_RATE: &str = "success_rate";

/// Series name for healing recovery times.
pub const METRIC_RECOVERY_TIME: &str = "recovery_time";

/// Window verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaStatus {
    SlaOk,
    Breach,
}

impl std::fmt::Display for SlaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SlaOk => write!(f, "SLA_OK"),
            Self::Breach => write!(f, "BREACH"),
        }
    }
}

/// Which threshold was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaViolation {
    LowSuccessRate,
    SlowRecovery,
}

/// Window size and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaConfig {
    /// Sliding window length in seconds.
    pub window_secs: u64,
    /// Minimum fraction of successful calls in the window.
    pub success_rate_threshold: f64,
    /// Maximum mean recovery time in seconds.
    pub recovery_time_threshold: f64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            window_secs: 3600,
            success_rate_threshold: 0.97,
            recovery_time_threshold: 5.0,
        }
    }
}

/// Verdict plus the specific violations behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaReport {
    pub sla_status: SlaStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<SlaViolation>,
}

impl SlaReport {
    /// A clean report.
    pub fn ok() -> Self {
        Self {
            sla_status: SlaStatus::SlaOk,
            violations: Vec::new(),
        }
    }
}

/// Records outcomes and evaluates the window.
pub struct SlaAggregator {
    store: Arc<dyn EngineStore>,
    config: SlaConfig,
}

impl SlaAggregator {
    pub fn new(store: Arc<dyn EngineStore>, config: SlaConfig) -> Self {
        Self { store, config }
    }

    /// Record a finished call (and, for healed failures, its recovery
    /// time), then evaluate the window.
    pub fn record(&self, succeeded: bool, recovery_time_secs: Option<f64>) -> SlaReport {
        self.record_at(unix_now_f64(), succeeded, recovery_time_secs)
    }

    /// Like [`record`](Self::record) but at an explicit timestamp, for
    /// backdating in tests.
    pub fn record_at(
        &self,
        timestamp: f64,
        succeeded: bool,
        recovery_time_secs: Option<f64>,
    ) -> SlaReport {
        // Samples outlive the window slightly so a read at the boundary
        // still sees them before pruning.
        let ttl = self.config.window_secs + 60;
        let flag = if succeeded { 1.0 } else { 0.0 };
        if let Err(err) = self
            .store
            .push_sample(METRIC_SUCCESS_RATE, timestamp, flag, ttl)
        {
            warn!(error = %err, "failed to record success sample");
        }
        if let Some(recovery) = recovery_time_secs {
            if let Err(err) = self
                .store
                .push_sample(METRIC_RECOVERY_TIME, timestamp, recovery, ttl)
            {
                warn!(error = %err, "failed to record recovery sample");
            }
        }
        self.status()
    }

    /// Evaluate the current window without recording anything.
    pub fn status(&self) -> SlaReport {
        let cutoff = unix_now_f64() - self.config.window_secs as f64;
        let mut violations = Vec::new();

        match self.store.samples_since(METRIC_SUCCESS_RATE, cutoff) {
            Ok(flags) if !flags.is_empty() => {
                let rate = flags.iter().sum::<f64>() / flags.len() as f64;
                if rate < self.config.success_rate_threshold {
                    violations.push(SlaViolation::LowSuccessRate);
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "success window unavailable; reporting SLA_OK");
            }
        }

        match self.store.samples_since(METRIC_RECOVERY_TIME, cutoff) {
            Ok(times) if !times.is_empty() => {
                let mean = times.iter().sum::<f64>() / times.len() as f64;
                if mean > self.config.recovery_time_threshold {
                    violations.push(SlaViolation::SlowRecovery);
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "recovery window unavailable; reporting SLA_OK");
            }
        }

        let sla_status = if violations.is_empty() {
            SlaStatus::SlaOk
        } else {
            SlaStatus::Breach
        };
        SlaReport {
            sla_status,
            violations,
        }
    }
}
