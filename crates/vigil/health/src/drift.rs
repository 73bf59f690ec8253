//! Baseline drift detection.
//!
//! Drift is the signed percentage deviation of a metric's current value from
//! its recorded baseline. The baseline moves only on an explicit reset, so
//! drift accumulates across cycles instead of tracking cycle-to-cycle noise.

use vigil_types::{DriftDirection, DriftLevel, DriftRecord, Metric};

use crate::config::DriftConfig;

/// Percentage drift substituted when the baseline is zero and the current
/// value is not.
pub const ZERO_BASELINE_DRIFT_PERCENT: f64 = 100.0;

/// Signed drift percentage of `current` relative to `baseline`.
///
/// Returns the percentage and whether the zero-baseline substitution applied.
/// A zero baseline yields 0 when `current` is also zero, otherwise ±100 with
/// the sign of `current`.
pub fn drift_percent(baseline: f64, current: f64) -> (f64, bool) {
    if baseline == 0.0 {
        let percent = if current == 0.0 {
            0.0
        } else {
            ZERO_BASELINE_DRIFT_PERCENT.copysign(current)
        };
        return (percent, true);
    }

    ((current - baseline) / baseline.abs() * 100.0, false)
}

/// Computes drift records with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct DriftDetector {
    config: DriftConfig,
}

impl DriftDetector {
    pub fn new(config: DriftConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Level for an absolute drift. Both thresholds are strict: a drift of
    /// exactly the significant threshold is only drifting.
    pub fn level(&self, percent: f64) -> DriftLevel {
        let magnitude = percent.abs();
        if magnitude > self.config.significant_percent {
            DriftLevel::Significant
        } else if magnitude > self.config.drifting_percent {
            DriftLevel::Drifting
        } else {
            DriftLevel::Stable
        }
    }

    /// Drift of a metric from its baseline.
    ///
    /// Returns `None` when the metric has no finite current value or no
    /// baseline yet.
    pub fn compute(&self, metric: &Metric) -> Option<DriftRecord> {
        let current = metric.current_value.filter(|v| v.is_finite())?;
        let baseline = metric.baseline.filter(|v| v.is_finite())?;

        let (percent, zero_baseline) = drift_percent(baseline, current);
        let window_label = match metric.baseline_set_at {
            Some(at) => format!("since {}", at.format("%Y-%m-%dT%H:%MZ")),
            None => "since baseline".to_string(),
        };

        Some(DriftRecord {
            metric_id: metric.id.clone(),
            category: metric.category,
            baseline,
            current,
            drift_percent: percent,
            direction: DriftDirection::from_percent(percent),
            level: self.level(percent),
            window_label,
            zero_baseline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::{MetricCategory, MetricDefinition, Polarity};

    fn metric(baseline: f64, current: f64) -> Metric {
        let def = MetricDefinition::new(
            "settlement_latency",
            MetricCategory::Performance,
            500.0,
            Polarity::HigherIsWorse,
        )
        .with_baseline(baseline);
        Metric::from_definition(&def).unwrap().with_value(current)
    }

    #[test]
    fn test_upward_drift() {
        let detector = DriftDetector::default();
        let record = detector.compute(&metric(120.0, 145.0)).unwrap();

        assert!((record.drift_percent - 20.8333).abs() < 1e-3);
        assert_eq!(record.direction, DriftDirection::Up);
        assert!(record.is_drifting());
        assert!(!record.zero_baseline);
    }

    #[test]
    fn test_significant_boundary_is_strict() {
        let detector = DriftDetector::default();
        assert_eq!(detector.level(20.0), DriftLevel::Drifting);
        assert_eq!(detector.level(20.1), DriftLevel::Significant);
        assert_eq!(detector.level(-20.1), DriftLevel::Significant);
        assert_eq!(detector.level(10.0), DriftLevel::Stable);
        assert_eq!(detector.level(10.5), DriftLevel::Drifting);

        // 120 -> 144 is exactly +20%
        let record = detector.compute(&metric(120.0, 144.0)).unwrap();
        assert!(record.is_drifting());
        assert!(!record.is_significant());
    }

    #[test]
    fn test_negative_baseline_uses_magnitude() {
        let (percent, _) = drift_percent(-50.0, -40.0);
        assert!((percent - 20.0).abs() < 1e-9);
        assert_eq!(DriftDirection::from_percent(percent), DriftDirection::Up);
    }

    #[test]
    fn test_zero_baseline_guard() {
        assert_eq!(drift_percent(0.0, 0.0), (0.0, true));
        assert_eq!(drift_percent(0.0, 3.5), (100.0, true));
        assert_eq!(drift_percent(0.0, -0.2), (-100.0, true));

        let record = DriftDetector::default()
            .compute(&metric(0.0, 7.0))
            .unwrap();
        assert!(record.zero_baseline);
        assert_eq!(record.direction, DriftDirection::Up);
        assert!(record.is_significant());
    }

    #[test]
    fn test_compute_is_idempotent() {
        let detector = DriftDetector::default();
        let m = metric(80.0, 95.0);
        assert_eq!(detector.compute(&m), detector.compute(&m));
    }

    #[test]
    fn test_no_record_without_baseline_or_value() {
        let detector = DriftDetector::default();
        let mut m = metric(10.0, 12.0);
        m.baseline = None;
        assert!(detector.compute(&m).is_none());

        let mut m = metric(10.0, 12.0);
        m.current_value = Some(f64::NAN);
        assert!(detector.compute(&m).is_none());
    }
}
