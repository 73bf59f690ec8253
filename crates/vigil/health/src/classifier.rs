//! Status classification.
//!
//! Converts a metric's value against its threshold into a status, a severity
//! and a trend. Classification is pure: the same metric and config always
//! produce the same result.

use vigil_types::{ClassifiedMetric, Metric, MetricStatus, Polarity, Severity, Trend};

use crate::config::ClassificationConfig;

/// Result of classifying a single metric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub status: MetricStatus,
    pub severity: Option<Severity>,
    pub ratio: Option<f64>,
}

impl Classification {
    fn unknown() -> Self {
        Self {
            status: MetricStatus::Unknown,
            severity: None,
            ratio: None,
        }
    }
}

/// Polarity-adjusted ratio of the current value to the threshold.
///
/// 1.0 means "at threshold" for either polarity; larger is worse. Returns
/// `None` when the metric has no usable value. A higher-is-better metric at or
/// below zero is infinitely bad.
pub fn polarity_ratio(metric: &Metric) -> Option<f64> {
    let value = metric.current_value?;
    if !value.is_finite() || !metric.threshold.is_finite() || metric.threshold <= 0.0 {
        return None;
    }

    let ratio = match metric.polarity {
        Polarity::HigherIsWorse => value / metric.threshold,
        Polarity::HigherIsBetter => {
            if value <= 0.0 {
                f64::INFINITY
            } else {
                metric.threshold / value
            }
        }
    };

    if ratio.is_nan() {
        None
    } else {
        Some(ratio)
    }
}

/// Classify a metric against its threshold.
///
/// Boundaries are inclusive on the worse side: a ratio exactly at a boundary
/// lands in the stricter bucket.
pub fn classify(metric: &Metric, config: &ClassificationConfig) -> Classification {
    let Some(ratio) = polarity_ratio(metric) else {
        return Classification::unknown();
    };

    let (status, severity) = if ratio >= config.critical_ratio {
        (MetricStatus::Critical, Severity::Critical)
    } else if ratio >= config.close_call_ratio {
        (MetricStatus::Degraded, Severity::High)
    } else if ratio >= config.degraded_ratio {
        (MetricStatus::Degraded, Severity::Medium)
    } else {
        (MetricStatus::Healthy, Severity::Low)
    };

    Classification {
        status,
        severity: Some(severity),
        ratio: Some(ratio),
    }
}

/// Direction of movement from the previous cycle's value.
pub fn trend(previous: Option<f64>, current: Option<f64>, epsilon: f64) -> Trend {
    match (previous, current) {
        (Some(previous), Some(current)) if previous.is_finite() && current.is_finite() => {
            let delta = current - previous;
            if delta > epsilon {
                Trend::Up
            } else if delta < -epsilon {
                Trend::Down
            } else {
                Trend::Stable
            }
        }
        _ => Trend::Stable,
    }
}

/// Applies classification rules with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct StatusClassifier {
    config: ClassificationConfig,
}

impl StatusClassifier {
    pub fn new(config: ClassificationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassificationConfig {
        &self.config
    }

    /// Classify a metric and attach its trend.
    pub fn classify_metric(&self, metric: &Metric) -> ClassifiedMetric {
        let classification = classify(metric, &self.config);
        ClassifiedMetric {
            metric: metric.clone(),
            status: classification.status,
            severity: classification.severity,
            trend: trend(
                metric.previous_value,
                metric.current_value,
                self.config.trend_epsilon,
            ),
            ratio: classification.ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::{MetricCategory, MetricDefinition};

    fn error_rate(value: f64) -> Metric {
        let def = MetricDefinition::new(
            "error_rate",
            MetricCategory::Performance,
            0.05,
            Polarity::HigherIsWorse,
        );
        Metric::from_definition(&def).unwrap().with_value(value)
    }

    fn compliance(value: f64) -> Metric {
        let def = MetricDefinition::new(
            "compliance_score",
            MetricCategory::Compliance,
            90.0,
            Polarity::HigherIsBetter,
        );
        Metric::from_definition(&def).unwrap().with_value(value)
    }

    #[test]
    fn test_error_rate_examples() {
        let config = ClassificationConfig::default();

        let healthy = classify(&error_rate(0.02), &config);
        assert_eq!(healthy.status, MetricStatus::Healthy);
        assert_eq!(healthy.severity, Some(Severity::Low));

        let critical = classify(&error_rate(0.051), &config);
        assert_eq!(critical.status, MetricStatus::Critical);
        assert_eq!(critical.severity, Some(Severity::Critical));
    }

    #[test]
    fn test_bands() {
        let config = ClassificationConfig::default();

        // ratio 0.8
        let medium = classify(&error_rate(0.04), &config);
        assert_eq!(medium.status, MetricStatus::Degraded);
        assert_eq!(medium.severity, Some(Severity::Medium));

        // ratio 0.96, close-call band
        let high = classify(&error_rate(0.048), &config);
        assert_eq!(high.status, MetricStatus::Degraded);
        assert_eq!(high.severity, Some(Severity::High));
    }

    #[test]
    fn test_exact_threshold_is_critical() {
        let config = ClassificationConfig::default();
        assert_eq!(
            classify(&error_rate(0.05), &config).status,
            MetricStatus::Critical
        );
        assert_eq!(
            classify(&compliance(90.0), &config).status,
            MetricStatus::Critical
        );
    }

    #[test]
    fn test_higher_is_better_inverts_ratio() {
        let config = ClassificationConfig::default();

        let healthy = classify(&compliance(150.0), &config);
        assert_eq!(healthy.status, MetricStatus::Healthy);
        assert!((healthy.ratio.unwrap() - 0.6).abs() < 1e-9);

        let critical = classify(&compliance(85.0), &config);
        assert_eq!(critical.status, MetricStatus::Critical);

        let zero = classify(&compliance(0.0), &config);
        assert_eq!(zero.status, MetricStatus::Critical);
    }

    #[test]
    fn test_unknown_without_usable_value() {
        let config = ClassificationConfig::default();
        let mut metric = error_rate(0.0);
        metric.current_value = None;
        assert_eq!(classify(&metric, &config).status, MetricStatus::Unknown);

        let nan = classify(&error_rate(f64::NAN), &config);
        assert_eq!(nan.status, MetricStatus::Unknown);
        assert_eq!(nan.severity, None);

        let inf = classify(&error_rate(f64::INFINITY), &config);
        assert_eq!(inf.status, MetricStatus::Unknown);
    }

    #[test]
    fn test_trend_uses_epsilon() {
        assert_eq!(trend(Some(1.0), Some(1.02), 0.01), Trend::Up);
        assert_eq!(trend(Some(1.0), Some(0.98), 0.01), Trend::Down);
        assert_eq!(trend(Some(1.0), Some(1.005), 0.01), Trend::Stable);
        assert_eq!(trend(None, Some(1.0), 0.01), Trend::Stable);
    }

    #[test]
    fn test_classify_metric_attaches_trend() {
        let classifier = StatusClassifier::default();
        let mut metric = error_rate(0.3);
        metric.previous_value = Some(0.1);

        let classified = classifier.classify_metric(&metric);
        assert_eq!(classified.trend, Trend::Up);
        assert!(classified.is_critical());
    }
}
