//! Voice quality scoring from RTP metrics.
//!
//! Pure arithmetic on whatever metrics the event carries. Missing metrics
//! contribute no penalty, so a metric-free event scores a perfect 1.0.

use serde::{Deserialize, Serialize};

/// Binary quality verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityLabel {
    Ok,
    Poor,
}

impl std::fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Poor => write!(f, "POOR"),
        }
    }
}

/// Scored quality for one event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub label: QualityLabel,
    /// 0.0 (unusable) to 1.0 (perfect), rounded to two decimals.
    pub score: f64,
}

/// Packet loss percentage above which the verdict is POOR.
pub const POOR_LOSS_THRESHOLD: f64 = 5.0;

/// Jitter (ms) above which the verdict is POOR.
pub const POOR_JITTER_THRESHOLD: u32 = 30;

/// Score RTP metrics.
///
/// Loss penalty is `rtp_loss * 0.1` capped at 0.5; jitter penalty is
/// `jitter / 100 * 0.2` capped at 0.3. The verdict is POOR when either
/// metric strictly exceeds its threshold, independent of the score.
pub fn score_quality(rtp_loss: Option<f64>, jitter: Option<u32>) -> QualityReport {
    let loss = rtp_loss.unwrap_or(0.0);
    let jitter_ms = jitter.unwrap_or(0);

    let loss_penalty = (loss * 0.1).min(0.5);
    let jitter_penalty = ((jitter_ms as f64 / 100.0) * 0.2).min(0.3);
    let score = (1.0 - loss_penalty - jitter_penalty).max(0.0);
    let score = (score * 100.0).round() / 100.0;

    let label = if loss > POOR_LOSS_THRESHOLD || jitter_ms > POOR_JITTER_THRESHOLD {
        QualityLabel::Poor
    } else {
        QualityLabel::Ok
    };

    QualityReport { label, score }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_call_is_perfect() {
        let report = score_quality(None, None);
        assert_eq!(report.label, QualityLabel::Ok);
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn test_heavy_loss_caps_penalty() {
        // 15% loss saturates the loss penalty at 0.5.
        let report = score_quality(Some(15.0), Some(0));
        assert_eq!(report.label, QualityLabel::Poor);
        assert_eq!(report.score, 0.5);
    }

    #[test]
    fn test_thresholds_are_strict() {
        assert_eq!(score_quality(Some(5.0), None).label, QualityLabel::Ok);
        assert_eq!(score_quality(Some(5.1), None).label, QualityLabel::Poor);
        assert_eq!(score_quality(None, Some(30)).label, QualityLabel::Ok);
        assert_eq!(score_quality(None, Some(31)).label, QualityLabel::Poor);
    }

    #[test]
    fn test_jitter_penalty_caps() {
        // 500ms jitter saturates the jitter penalty at 0.3.
        let report = score_quality(None, Some(500));
        assert_eq!(report.score, 0.7);
        assert_eq!(report.label, QualityLabel::Poor);
    }

    #[test]
    fn test_combined_penalties() {
        // 2% loss -> 0.2 penalty, 10ms jitter -> 0.02 penalty.
        let report = score_quality(Some(2.0), Some(10));
        assert_eq!(report.score, 0.78);
        assert_eq!(report.label, QualityLabel::Ok);
    }

    #[test]
    fn test_score_never_negative() {
        let report = score_quality(Some(100.0), Some(1000));
        assert_eq!(report.score, 0.2);
        let worst = score_quality(Some(100.0), Some(u32::MAX));
        assert!(worst.score >= 0.0);
    }
}
