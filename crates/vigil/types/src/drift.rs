//! Baseline drift records

use serde::{Deserialize, Serialize};

use crate::{MetricCategory, MetricId};

/// Sign of a drift percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftDirection {
    Up,
    Down,
    /// Drift of exactly zero.
    Flat,
}

impl DriftDirection {
    pub fn from_percent(percent: f64) -> Self {
        if percent > 0.0 {
            DriftDirection::Up
        } else if percent < 0.0 {
            DriftDirection::Down
        } else {
            DriftDirection::Flat
        }
    }
}

impl std::fmt::Display for DriftDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftDirection::Up => write!(f, "up"),
            DriftDirection::Down => write!(f, "down"),
            DriftDirection::Flat => write!(f, "flat"),
        }
    }
}

/// How far a metric has moved away from its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftLevel {
    /// Within the drifting threshold.
    Stable,
    /// Above the drifting threshold, at or below the significant one.
    Drifting,
    /// Above the significant-drift threshold.
    Significant,
}

/// Drift of one metric from its baseline for the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub metric_id: MetricId,
    pub category: MetricCategory,
    pub baseline: f64,
    pub current: f64,

    /// Signed percentage drift relative to `|baseline|`.
    pub drift_percent: f64,

    pub direction: DriftDirection,
    pub level: DriftLevel,

    /// Label of the window the baseline covers, e.g. "since 2024-03-01T00:00Z".
    pub window_label: String,

    /// The baseline was zero and the drift percent was substituted instead of
    /// divided.
    pub zero_baseline: bool,
}

impl DriftRecord {
    pub fn is_drifting(&self) -> bool {
        self.level >= DriftLevel::Drifting
    }

    pub fn is_significant(&self) -> bool {
        self.level == DriftLevel::Significant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_percent() {
        assert_eq!(DriftDirection::from_percent(20.8), DriftDirection::Up);
        assert_eq!(DriftDirection::from_percent(-0.1), DriftDirection::Down);
        assert_eq!(DriftDirection::from_percent(0.0), DriftDirection::Flat);
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(DriftLevel::Significant > DriftLevel::Drifting);
        assert!(DriftLevel::Drifting > DriftLevel::Stable);
    }
}
