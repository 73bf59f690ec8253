//! Status, severity and trend of a classified metric
//!
//! These are closed enums so that every classification rule can be matched
//! exhaustively.

use serde::{Deserialize, Serialize};

use crate::Metric;

/// Health status of a metric against its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Healthy,
    Degraded,
    Critical,
    /// The metric could not be classified this cycle (no observation,
    /// malformed value). Excluded from the composite score.
    Unknown,
}

impl std::fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricStatus::Healthy => write!(f, "healthy"),
            MetricStatus::Degraded => write!(f, "degraded"),
            MetricStatus::Critical => write!(f, "critical"),
            MetricStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Severity levels, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Direction of movement since the previous evaluation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

/// A metric together with the classification derived for the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedMetric {
    #[serde(flatten)]
    pub metric: Metric,

    pub status: MetricStatus,

    /// Severity of the status. `None` when the status is unknown.
    pub severity: Option<Severity>,

    pub trend: Trend,

    /// Polarity-adjusted ratio of value to threshold (1.0 = at threshold).
    pub ratio: Option<f64>,
}

impl ClassifiedMetric {
    pub fn is_critical(&self) -> bool {
        self.status == MetricStatus::Critical
    }

    pub fn is_known(&self) -> bool {
        self.status != MetricStatus::Unknown
    }
}
