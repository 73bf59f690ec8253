//! Composite health scoring.
//!
//! Starts from 100 and subtracts weighted penalties for critical and
//! close-call metrics, open anomalies and significant drift. The risk band
//! follows the score, except that a critical metric or an open critical
//! anomaly never lets the band read LOW.

use chrono::{DateTime, Utc};
use vigil_types::{
    AnomalyEvent, ClassifiedMetric, DriftRecord, HealthSnapshot, MetricStatus, RiskBand, Severity,
};

use crate::config::ScoringConfig;

const BASE_SCORE: u32 = 100;

/// Inputs counted by the scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreInputs {
    pub critical_count: usize,
    pub high_count: usize,
    pub drift_count: usize,
    pub significant_drift_count: usize,
    pub unresolved_anomaly_count: usize,
    pub unknown_count: usize,

    /// Whether any open anomaly has critical severity.
    pub critical_anomaly_open: bool,
}

impl ScoreInputs {
    /// Count the scoring inputs. Unknown metrics are only counted as unknown,
    /// and so is their drift.
    pub fn count(
        classified: &[ClassifiedMetric],
        drift: &[DriftRecord],
        anomalies: &[AnomalyEvent],
    ) -> Self {
        let mut inputs = ScoreInputs::default();

        for metric in classified {
            match metric.status {
                MetricStatus::Unknown => inputs.unknown_count += 1,
                MetricStatus::Critical => inputs.critical_count += 1,
                _ if metric.severity == Some(Severity::High) => inputs.high_count += 1,
                _ => {}
            }
        }

        let is_known = |record: &DriftRecord| {
            classified
                .iter()
                .find(|m| m.metric.id == record.metric_id)
                .map_or(true, ClassifiedMetric::is_known)
        };
        for record in drift.iter().filter(|r| is_known(*r)) {
            if record.is_drifting() {
                inputs.drift_count += 1;
            }
            if record.is_significant() {
                inputs.significant_drift_count += 1;
            }
        }

        for anomaly in anomalies.iter().filter(|a| a.is_open()) {
            inputs.unresolved_anomaly_count += 1;
            if anomaly.severity == Severity::Critical {
                inputs.critical_anomaly_open = true;
            }
        }

        inputs
    }
}

/// Aggregates classified metrics and anomalies into a snapshot.
#[derive(Debug, Clone, Default)]
pub struct CompositeScorer {
    config: ScoringConfig,
}

impl CompositeScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Numeric score in `0..=100`.
    pub fn composite_score(&self, inputs: &ScoreInputs) -> u8 {
        let weights = &self.config.weights;
        let penalty = [
            (inputs.critical_count, weights.critical_metric),
            (inputs.high_count, weights.high_metric),
            (inputs.unresolved_anomaly_count, weights.open_anomaly),
            (inputs.significant_drift_count, weights.significant_drift),
        ]
        .iter()
        .fold(0u32, |total, &(count, weight)| {
            let count = u32::try_from(count).unwrap_or(u32::MAX);
            total.saturating_add(count.saturating_mul(weight))
        });

        // Bounded by BASE_SCORE, so the cast cannot truncate.
        BASE_SCORE.saturating_sub(penalty) as u8
    }

    /// Band implied by the score alone.
    pub fn band_for(&self, score: u8) -> RiskBand {
        if score >= self.config.low_risk_min {
            RiskBand::Low
        } else if score >= self.config.elevated_risk_min {
            RiskBand::Elevated
        } else {
            RiskBand::Critical
        }
    }

    /// Band after the operational-risk override, and whether the override
    /// lowered it.
    pub fn band(&self, score: u8, inputs: &ScoreInputs) -> (RiskBand, bool) {
        let band = self.band_for(score);
        let operational_risk = inputs.critical_count > 0 || inputs.critical_anomaly_open;
        if operational_risk && band == RiskBand::Low {
            (RiskBand::Elevated, true)
        } else {
            (band, false)
        }
    }

    pub fn score(
        &self,
        classified: &[ClassifiedMetric],
        drift: &[DriftRecord],
        anomalies: &[AnomalyEvent],
        cycle: u64,
        generated_at: DateTime<Utc>,
    ) -> HealthSnapshot {
        let inputs = ScoreInputs::count(classified, drift, anomalies);
        let composite_score = self.composite_score(&inputs);
        let (risk_band, band_capped) = self.band(composite_score, &inputs);

        HealthSnapshot {
            composite_score,
            risk_band,
            band_capped,
            critical_count: inputs.critical_count,
            high_count: inputs.high_count,
            drift_count: inputs.drift_count,
            significant_drift_count: inputs.significant_drift_count,
            unresolved_anomaly_count: inputs.unresolved_anomaly_count,
            unknown_count: inputs.unknown_count,
            cycle,
            generated_at,
        }
    }
}
