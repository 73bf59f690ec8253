//! Monitoring configuration.
//!
//! Defines classification boundaries, drift thresholds, anomaly debouncing,
//! scoring weights and refresh timing. Every value is a policy choice and can
//! be overridden from a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HealthError, HealthResult};

/// Preset configurations for common monitoring targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorProfile {
    #[default]
    Standard,
    /// Period-end close: tighter drift limits, faster refresh, longer debounce.
    FinancialClose,
    /// Local development: relaxed limits.
    Development,
}

/// Configuration for the monitoring engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Status classification boundaries.
    pub classification: ClassificationConfig,

    /// Drift thresholds.
    pub drift: DriftConfig,

    /// Anomaly lifecycle settings.
    pub anomaly: AnomalyConfig,

    /// Composite score weights and bands.
    pub scoring: ScoringConfig,

    /// Refresh scheduling.
    pub refresh: RefreshConfig,
}

impl MonitorConfig {
    /// Create config tuned for a monitoring profile.
    pub fn for_profile(profile: MonitorProfile) -> Self {
        let mut config = Self::default();

        match profile {
            MonitorProfile::Standard => {}
            MonitorProfile::FinancialClose => {
                config.drift.drifting_percent = 5.0;
                config.drift.significant_percent = 10.0;
                config.anomaly.clear_cycles = 3;
                config.refresh.interval_ms = 10_000;
            }
            MonitorProfile::Development => {
                config.drift.drifting_percent = 25.0;
                config.drift.significant_percent = 50.0;
                config.anomaly.clear_cycles = 1;
                config.refresh.auto_refresh = false;
            }
        }

        config
    }

    /// Parse a configuration from TOML. Missing sections take defaults.
    pub fn from_toml_str(source: &str) -> HealthResult<Self> {
        let config: MonitorConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> HealthResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            HealthError::InvalidConfiguration(format!("reading {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// Check that boundaries are ordered and timings are usable.
    pub fn validate(&self) -> HealthResult<()> {
        self.classification.validate()?;
        self.drift.validate()?;
        self.scoring.validate()?;
        self.refresh.validate()?;
        if self.anomaly.clear_cycles == 0 {
            return Err(HealthError::InvalidConfiguration(
                "anomaly.clear_cycles must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ratio boundaries for status classification.
///
/// The ratio is `value / threshold` for higher-is-worse metrics and its
/// inverse for higher-is-better ones, so 1.0 always means "at threshold".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Ratio at which a metric leaves healthy and becomes degraded.
    pub degraded_ratio: f64,

    /// Ratio at which a degraded metric is escalated to high severity.
    pub close_call_ratio: f64,

    /// Ratio at which a metric is critical.
    pub critical_ratio: f64,

    /// Absolute change below which the trend is stable.
    pub trend_epsilon: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            degraded_ratio: 0.7,
            close_call_ratio: 0.95,
            critical_ratio: 1.0,
            trend_epsilon: 0.01,
        }
    }
}

impl ClassificationConfig {
    fn validate(&self) -> HealthResult<()> {
        let ordered = self.degraded_ratio > 0.0
            && self.degraded_ratio <= self.close_call_ratio
            && self.close_call_ratio <= self.critical_ratio;
        if !ordered {
            return Err(HealthError::InvalidConfiguration(format!(
                "classification ratios must satisfy \
                 0 < degraded ({}) <= close_call ({}) <= critical ({})",
                self.degraded_ratio, self.close_call_ratio, self.critical_ratio
            )));
        }
        if self.trend_epsilon.is_nan() || self.trend_epsilon < 0.0 {
            return Err(HealthError::InvalidConfiguration(
                "classification.trend_epsilon must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Drift thresholds, as absolute percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// A metric is drifting when `|drift| >` this value.
    pub drifting_percent: f64,

    /// A metric drifts significantly when `|drift| >` this value.
    pub significant_percent: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            drifting_percent: 10.0,
            significant_percent: 20.0,
        }
    }
}

impl DriftConfig {
    fn validate(&self) -> HealthResult<()> {
        let ordered =
            self.drifting_percent >= 0.0 && self.drifting_percent <= self.significant_percent;
        if !ordered {
            return Err(HealthError::InvalidConfiguration(format!(
                "drift thresholds must satisfy 0 <= drifting ({}) <= significant ({})",
                self.drifting_percent, self.significant_percent
            )));
        }
        Ok(())
    }
}

/// Anomaly lifecycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Consecutive clear cycles before an anomaly auto-resolves.
    pub clear_cycles: u32,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self { clear_cycles: 2 }
    }
}

/// Penalty points subtracted from the base score of 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub critical_metric: u32,
    pub high_metric: u32,
    pub open_anomaly: u32,
    pub significant_drift: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            critical_metric: 15,
            high_metric: 7,
            open_anomaly: 3,
            significant_drift: 2,
        }
    }
}

/// Composite score weights and risk band boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,

    /// Minimum score labelled LOW risk.
    pub low_risk_min: u8,

    /// Minimum score labelled ELEVATED risk; anything below is CRITICAL.
    pub elevated_risk_min: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            low_risk_min: 80,
            elevated_risk_min: 60,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> HealthResult<()> {
        if self.elevated_risk_min > self.low_risk_min || self.low_risk_min > 100 {
            return Err(HealthError::InvalidConfiguration(format!(
                "risk bands must satisfy elevated ({}) <= low ({}) <= 100",
                self.elevated_risk_min, self.low_risk_min
            )));
        }
        Ok(())
    }
}

/// Refresh scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Interval between scheduled evaluations.
    pub interval_ms: u64,

    /// Upper bound on a single evaluation, after which it fails as stale.
    pub evaluation_timeout_ms: u64,

    /// Whether the interval timer runs at start.
    pub auto_refresh: bool,

    /// A snapshot older than `stale_factor × interval` is stale.
    pub stale_factor: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            evaluation_timeout_ms: 5_000,
            auto_refresh: true,
            stale_factor: 2,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }

    /// Age beyond which a snapshot is considered stale.
    pub fn stale_after(&self) -> Duration {
        self.interval() * self.stale_factor
    }

    fn validate(&self) -> HealthResult<()> {
        if self.interval_ms == 0 || self.evaluation_timeout_ms == 0 || self.stale_factor == 0 {
            return Err(HealthError::InvalidConfiguration(
                "refresh interval, evaluation timeout and stale factor must be non-zero"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
