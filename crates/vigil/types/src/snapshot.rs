//! Composite health snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Three-band risk label derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBand {
    Low,
    Elevated,
    Critical,
}

impl std::fmt::Display for RiskBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskBand::Low => write!(f, "LOW"),
            RiskBand::Elevated => write!(f, "ELEVATED"),
            RiskBand::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Aggregate health of all monitored metrics at one point in time.
///
/// Snapshots are wholly derived and never mutated; each evaluation cycle
/// publishes a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Composite health index, 0 (worst) to 100 (best).
    pub composite_score: u8,

    pub risk_band: RiskBand,

    /// The band was capped at `Elevated` by a critical metric or anomaly even
    /// though the score alone would have been `Low`.
    pub band_capped: bool,

    /// Metrics in critical status.
    pub critical_count: usize,

    /// Metrics with high severity (the close-call band).
    pub high_count: usize,

    /// Metrics drifting beyond the drifting threshold.
    pub drift_count: usize,

    /// Metrics drifting beyond the significant-drift threshold.
    pub significant_drift_count: usize,

    pub unresolved_anomaly_count: usize,

    /// Metrics excluded from scoring because they could not be classified.
    pub unknown_count: usize,

    /// Sequence number of the evaluation cycle that produced the snapshot.
    pub cycle: u64,

    pub generated_at: DateTime<Utc>,
}

impl HealthSnapshot {
    /// Age of the snapshot relative to `now`, in milliseconds.
    pub fn age_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.generated_at).num_milliseconds().max(0) as u64
    }
}
