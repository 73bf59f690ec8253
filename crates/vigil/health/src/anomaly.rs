//! Anomaly classification and history.
//!
//! Rules fire on transitions: a metric newly entering critical status, or
//! drift newly crossing a threshold. Condition-based anomalies close once the
//! condition stays clear for a configured number of cycles; externally
//! signalled ones close only on acknowledgement.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};
use vigil_types::{
    AnomalyEvent, AnomalyId, AnomalyTrigger, ClassifiedMetric, DriftLevel, DriftRecord,
    ExternalSignal, Metric, MetricCategory, MetricId, MetricStatus, Resolution, Severity,
};

use crate::config::AnomalyConfig;
use crate::error::{HealthError, HealthResult};

/// Everything the anomaly rules need to know about one metric in one cycle.
#[derive(Debug, Clone)]
pub struct MetricEvaluation {
    pub classified: ClassifiedMetric,
    pub drift: Option<DriftRecord>,

    /// Status the metric had at the previous cycle's value.
    pub prior_status: MetricStatus,

    /// Drift level the metric had at the previous cycle's value.
    pub prior_drift: DriftLevel,
}

impl MetricEvaluation {
    fn drift_level(&self) -> DriftLevel {
        self.drift
            .as_ref()
            .map(|d| d.level)
            .unwrap_or(DriftLevel::Stable)
    }
}

#[derive(Debug, Default)]
struct HistoryInner {
    /// Oldest first; listing reverses.
    events: Vec<AnomalyEvent>,
    index: HashMap<AnomalyId, usize>,
    clear_streaks: HashMap<AnomalyId, u32>,
}

/// Append-only anomaly history.
///
/// Events are never removed. The only mutation is the one-way transition
/// into the resolved state.
#[derive(Debug, Default)]
pub struct AnomalyHistory {
    inner: RwLock<HistoryInner>,
}

impl AnomalyHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: AnomalyEvent) -> AnomalyEvent {
        let mut inner = self.inner.write();
        let pos = inner.events.len();
        inner.index.insert(event.id, pos);
        inner.events.push(event.clone());
        event
    }

    pub fn get(&self, id: AnomalyId) -> HealthResult<AnomalyEvent> {
        let inner = self.inner.read();
        inner
            .index
            .get(&id)
            .map(|&pos| inner.events[pos].clone())
            .ok_or(HealthError::AnomalyNotFound(id))
    }

    /// Events newest first, optionally only those at or after `since`.
    pub fn list(&self, since: Option<DateTime<Utc>>) -> Vec<AnomalyEvent> {
        let inner = self.inner.read();
        let mut events: Vec<AnomalyEvent> = inner
            .events
            .iter()
            .rev()
            .filter(|e| since.map_or(true, |since| e.timestamp >= since))
            .cloned()
            .collect();
        // Signals may carry an older timestamp than events recorded before them.
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events
    }

    pub fn open(&self) -> Vec<AnomalyEvent> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| e.is_open())
            .cloned()
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.inner.read().events.iter().filter(|e| e.is_open()).count()
    }

    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an open anomaly with this trigger exists for the metric.
    pub fn has_open(&self, metric_id: &MetricId, trigger: &AnomalyTrigger) -> bool {
        self.inner.read().events.iter().any(|e| {
            e.is_open() && e.metric_id.as_ref() == Some(metric_id) && &e.trigger == trigger
        })
    }

    /// Close an anomaly by explicit acknowledgement.
    ///
    /// Acknowledging an already resolved anomaly returns it unchanged.
    pub fn acknowledge(&self, id: AnomalyId, now: DateTime<Utc>) -> HealthResult<AnomalyEvent> {
        let mut inner = self.inner.write();
        let pos = *inner
            .index
            .get(&id)
            .ok_or(HealthError::AnomalyNotFound(id))?;
        inner.clear_streaks.remove(&id);

        let event = &mut inner.events[pos];
        if event.is_open() {
            resolve(event, Resolution::Acknowledged, now);
            info!(anomaly_id = %id, "Anomaly acknowledged");
        }
        Ok(event.clone())
    }

    /// Advance the clear streak of an open condition-based anomaly.
    ///
    /// Returns the resolved event once the condition has been clear for
    /// `clear_cycles` consecutive cycles.
    fn observe_condition(
        &self,
        id: AnomalyId,
        active: bool,
        clear_cycles: u32,
        now: DateTime<Utc>,
    ) -> Option<AnomalyEvent> {
        let mut inner = self.inner.write();
        let pos = *inner.index.get(&id)?;
        if !inner.events[pos].is_open() {
            return None;
        }

        if active {
            inner.clear_streaks.remove(&id);
            return None;
        }

        let streak = inner.clear_streaks.entry(id).or_insert(0);
        *streak += 1;
        if *streak < clear_cycles {
            debug!(anomaly_id = %id, streak = *streak, "Anomaly condition clear");
            return None;
        }

        inner.clear_streaks.remove(&id);
        let event = &mut inner.events[pos];
        resolve(event, Resolution::ConditionCleared, now);
        Some(event.clone())
    }

    fn open_for_metric(&self, metric_id: &MetricId) -> Vec<(AnomalyId, AnomalyTrigger)> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| {
                e.is_open()
                    && e.trigger.is_condition_based()
                    && e.metric_id.as_ref() == Some(metric_id)
            })
            .map(|e| (e.id, e.trigger.clone()))
            .collect()
    }
}

fn resolve(event: &mut AnomalyEvent, resolution: Resolution, now: DateTime<Utc>) {
    event.auto_resolved = true;
    event.resolution = Some(resolution);
    event.resolved_at = Some(now);
}

/// Anomalies raised and resolved by one evaluation cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleAnomalies {
    pub raised: Vec<AnomalyEvent>,
    pub resolved: Vec<AnomalyEvent>,
}

/// Applies the anomaly rules to a cycle's evaluations.
#[derive(Debug, Clone, Default)]
pub struct AnomalyClassifier {
    config: AnomalyConfig,
}

impl AnomalyClassifier {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Raise and resolve anomalies for one cycle, recording them in `history`.
    ///
    /// Metrics with unknown status are skipped entirely: they neither raise
    /// anomalies nor advance clear streaks.
    pub fn evaluate(
        &self,
        history: &AnomalyHistory,
        evaluations: &[MetricEvaluation],
        now: DateTime<Utc>,
    ) -> CycleAnomalies {
        let mut cycle = CycleAnomalies::default();

        for evaluation in evaluations {
            if !evaluation.classified.is_known() {
                continue;
            }
            let metric = &evaluation.classified.metric;
            let level = evaluation.drift_level();
            let critical = evaluation.classified.is_critical();

            let mut significant_cleared = false;
            for (id, trigger) in history.open_for_metric(&metric.id) {
                let active = match trigger {
                    AnomalyTrigger::CriticalCrossing => critical,
                    AnomalyTrigger::SignificantDrift => level == DriftLevel::Significant,
                    AnomalyTrigger::ModerateDrift => level >= DriftLevel::Drifting,
                    AnomalyTrigger::ExternalSignal { .. } => true,
                };
                if let Some(resolved) =
                    history.observe_condition(id, active, self.config.clear_cycles, now)
                {
                    info!(
                        anomaly_id = %resolved.id,
                        metric_id = %metric.id,
                        trigger = %resolved.trigger,
                        "Anomaly auto-resolved"
                    );
                    significant_cleared |= resolved.trigger == AnomalyTrigger::SignificantDrift;
                    cycle.resolved.push(resolved);
                }
            }

            let fired =
                self.rules_fired(history, evaluation, level, critical, significant_cleared, now);
            for event in fired {
                info!(
                    anomaly_id = %event.id,
                    metric_id = %metric.id,
                    severity = %event.severity,
                    trigger = %event.trigger,
                    "Anomaly raised"
                );
                cycle.raised.push(history.record(event));
            }
        }

        cycle
    }

    fn rules_fired(
        &self,
        history: &AnomalyHistory,
        evaluation: &MetricEvaluation,
        level: DriftLevel,
        critical: bool,
        significant_cleared: bool,
        now: DateTime<Utc>,
    ) -> Vec<AnomalyEvent> {
        let metric = &evaluation.classified.metric;
        let mut events = Vec::new();

        if critical
            && evaluation.prior_status != MetricStatus::Critical
            && !history.has_open(&metric.id, &AnomalyTrigger::CriticalCrossing)
        {
            events.push(critical_crossing(metric, evaluation.classified.ratio, now));
        }

        if let Some(drift) = &evaluation.drift {
            let significant_open = history.has_open(&metric.id, &AnomalyTrigger::SignificantDrift);
            match level {
                DriftLevel::Significant
                    if evaluation.prior_drift != DriftLevel::Significant && !significant_open =>
                {
                    events.push(drift_anomaly(
                        metric,
                        drift,
                        Severity::High,
                        AnomalyTrigger::SignificantDrift,
                        now,
                    ));
                }
                // A significant anomaly that clears while drift stays in the
                // drifting band hands over to a moderate one.
                DriftLevel::Drifting
                    if (evaluation.prior_drift == DriftLevel::Stable || significant_cleared)
                        && !significant_open
                        && !history.has_open(&metric.id, &AnomalyTrigger::ModerateDrift) =>
                {
                    events.push(drift_anomaly(
                        metric,
                        drift,
                        Severity::Medium,
                        AnomalyTrigger::ModerateDrift,
                        now,
                    ));
                }
                _ => {}
            }
        }

        events
    }
}

fn format_value(value: f64, unit: &str) -> String {
    if unit.is_empty() {
        format!("{}", value)
    } else {
        format!("{} {}", value, unit)
    }
}

fn metric_anomaly(
    metric: &Metric,
    severity: Severity,
    trigger: AnomalyTrigger,
    title: String,
    description: String,
    now: DateTime<Utc>,
) -> AnomalyEvent {
    AnomalyEvent {
        id: AnomalyId::generate(),
        timestamp: now,
        category: metric.category,
        severity,
        title,
        description,
        affected_systems: BTreeSet::from([metric.id.to_string()]),
        auto_resolved: false,
        financial_integrity_impact: metric.affects_financial_integrity(),
        metric_id: Some(metric.id.clone()),
        trigger,
        resolution: None,
        resolved_at: None,
    }
}

/// Anomaly for a metric entering critical status.
pub fn critical_crossing(metric: &Metric, ratio: Option<f64>, now: DateTime<Utc>) -> AnomalyEvent {
    let value = metric.current_value.unwrap_or(f64::NAN);
    let mut description = format!(
        "{} is {} against threshold {}",
        metric.name,
        format_value(value, &metric.unit),
        format_value(metric.threshold, &metric.unit),
    );
    if let Some(ratio) = ratio.filter(|r| r.is_finite()) {
        description.push_str(&format!(" ({:.0}% of limit)", ratio * 100.0));
    }

    metric_anomaly(
        metric,
        Severity::Critical,
        AnomalyTrigger::CriticalCrossing,
        format!("{} crossed critical threshold", metric.name),
        description,
        now,
    )
}

/// Anomaly for a metric drifting from its baseline.
pub fn drift_anomaly(
    metric: &Metric,
    drift: &DriftRecord,
    severity: Severity,
    trigger: AnomalyTrigger,
    now: DateTime<Utc>,
) -> AnomalyEvent {
    metric_anomaly(
        metric,
        severity,
        trigger,
        format!(
            "{} drifted {:+.1}% from baseline",
            metric.name, drift.drift_percent
        ),
        format!(
            "baseline {} -> current {} ({})",
            format_value(drift.baseline, &metric.unit),
            format_value(drift.current, &metric.unit),
            drift.window_label
        ),
        now,
    )
}

/// Anomaly for an externally reported problem.
///
/// A signal tied to a metric inherits its category and integrity tagging;
/// otherwise the signal must name a category itself.
pub fn from_signal(signal: &ExternalSignal, metric: Option<&Metric>) -> HealthResult<AnomalyEvent> {
    let category = metric
        .map(|m| m.category)
        .or(signal.category)
        .ok_or_else(|| {
            HealthError::InvalidSignal(format!(
                "signal '{}' from {} has neither a metric nor a category",
                signal.title, signal.source
            ))
        })?;

    let financial_integrity_impact = match metric {
        Some(metric) => metric.affects_financial_integrity(),
        None => category == MetricCategory::Financial && signal.integrity_critical,
    };

    let mut affected_systems = signal.affected_systems.clone();
    if let Some(metric) = metric {
        affected_systems.insert(metric.id.to_string());
    }

    Ok(AnomalyEvent {
        id: AnomalyId::generate(),
        timestamp: signal.timestamp,
        category,
        severity: signal.severity,
        title: signal.title.clone(),
        description: signal.description.clone(),
        affected_systems,
        auto_resolved: false,
        financial_integrity_impact,
        metric_id: metric.map(|m| m.id.clone()),
        trigger: AnomalyTrigger::ExternalSignal {
            source: signal.source.clone(),
        },
        resolution: None,
        resolved_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::StatusClassifier;
    use crate::drift::DriftDetector;
    use vigil_types::{MetricDefinition, Polarity};

    fn tb_variance() -> Metric {
        let def = MetricDefinition::new(
            "tb_variance",
            MetricCategory::Financial,
            1000.0,
            Polarity::HigherIsWorse,
        )
        .with_unit("USD")
        .with_baseline(100.0)
        .integrity_critical();
        Metric::from_definition(&def).unwrap()
    }

    fn evaluate_at(metric: Metric, prior: Option<f64>) -> MetricEvaluation {
        let classifier = StatusClassifier::default();
        let detector = DriftDetector::default();
        let prior_metric = Metric {
            current_value: prior,
            ..metric.clone()
        };
        MetricEvaluation {
            prior_status: classifier.classify_metric(&prior_metric).status,
            prior_drift: detector
                .compute(&prior_metric)
                .map(|d| d.level)
                .unwrap_or(DriftLevel::Stable),
            drift: detector.compute(&metric),
            classified: classifier.classify_metric(&metric),
        }
    }

    #[test]
    fn test_critical_crossing_raised_once() {
        let history = AnomalyHistory::new();
        let rules = AnomalyClassifier::default();
        let now = Utc::now();

        let cycle = rules.evaluate(
            &history,
            &[evaluate_at(tb_variance().with_value(1500.0), None)],
            now,
        );
        let critical: Vec<_> = cycle
            .raised
            .iter()
            .filter(|e| e.trigger == AnomalyTrigger::CriticalCrossing)
            .collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].severity, Severity::Critical);
        assert!(critical[0].financial_integrity_impact);

        // Still critical: no new crossing.
        let cycle = rules.evaluate(
            &history,
            &[evaluate_at(tb_variance().with_value(1600.0), Some(1500.0))],
            now,
        );
        assert!(cycle
            .raised
            .iter()
            .all(|e| e.trigger != AnomalyTrigger::CriticalCrossing));
    }

    #[test]
    fn test_drift_severity_mapping() {
        let history = AnomalyHistory::new();
        let rules = AnomalyClassifier::default();
        let now = Utc::now();

        // +15% from baseline 100
        let cycle = rules.evaluate(
            &history,
            &[evaluate_at(tb_variance().with_value(115.0), Some(100.0))],
            now,
        );
        assert_eq!(cycle.raised.len(), 1);
        assert_eq!(cycle.raised[0].severity, Severity::Medium);
        assert_eq!(cycle.raised[0].trigger, AnomalyTrigger::ModerateDrift);

        // Escalates to +30%
        let cycle = rules.evaluate(
            &history,
            &[evaluate_at(tb_variance().with_value(130.0), Some(115.0))],
            now,
        );
        assert_eq!(cycle.raised.len(), 1);
        assert_eq!(cycle.raised[0].severity, Severity::High);
        assert_eq!(history.open_count(), 2);
    }

    #[test]
    fn test_auto_resolve_after_clear_cycles() {
        let history = AnomalyHistory::new();
        let rules = AnomalyClassifier::default();
        let now = Utc::now();

        rules.evaluate(
            &history,
            &[evaluate_at(tb_variance().with_value(1500.0), None)],
            now,
        );
        let open = history.open_count();
        assert!(open >= 1);

        let healthy = || evaluate_at(tb_variance().with_value(100.0), Some(100.0));

        let first = rules.evaluate(&history, &[healthy()], now);
        assert!(first.resolved.is_empty());

        let second = rules.evaluate(&history, &[healthy()], now);
        assert_eq!(second.resolved.len(), open);
        assert!(second
            .resolved
            .iter()
            .all(|e| e.resolution == Some(Resolution::ConditionCleared)));
        assert_eq!(history.open_count(), 0);
    }

    #[test]
    fn test_significant_drift_hands_over_to_moderate() {
        let history = AnomalyHistory::new();
        let rules = AnomalyClassifier::default();
        let now = Utc::now();

        // baseline 100: 130 is +30% (significant), 115 is +15% (drifting)
        let cycle = rules.evaluate(
            &history,
            &[evaluate_at(tb_variance().with_value(130.0), None)],
            now,
        );
        assert_eq!(cycle.raised.len(), 1);
        assert_eq!(cycle.raised[0].trigger, AnomalyTrigger::SignificantDrift);

        let cycle = rules.evaluate(
            &history,
            &[evaluate_at(tb_variance().with_value(115.0), Some(130.0))],
            now,
        );
        assert!(cycle.raised.is_empty());
        assert!(cycle.resolved.is_empty());

        let cycle = rules.evaluate(
            &history,
            &[evaluate_at(tb_variance().with_value(115.0), Some(115.0))],
            now,
        );
        assert_eq!(cycle.resolved.len(), 1);
        assert_eq!(cycle.raised.len(), 1);
        assert_eq!(cycle.raised[0].trigger, AnomalyTrigger::ModerateDrift);
        assert_eq!(cycle.raised[0].severity, Severity::Medium);
        assert_eq!(history.open_count(), 1);

        // Staying in the band does not raise it again.
        let cycle = rules.evaluate(
            &history,
            &[evaluate_at(tb_variance().with_value(115.0), Some(115.0))],
            now,
        );
        assert!(cycle.raised.is_empty());
    }

    #[test]
    fn test_flapping_condition_resets_streak() {
        let history = AnomalyHistory::new();
        let rules = AnomalyClassifier::default();
        let now = Utc::now();

        rules.evaluate(
            &history,
            &[evaluate_at(tb_variance().with_value(1500.0), None)],
            now,
        );
        let clear = evaluate_at(tb_variance().with_value(100.0), Some(100.0));
        let critical = evaluate_at(tb_variance().with_value(1500.0), Some(100.0));

        rules.evaluate(&history, &[clear.clone()], now);
        let cycle = rules.evaluate(&history, &[critical], now);
        // Crossing again while the first anomaly is open does not duplicate it.
        assert!(cycle
            .raised
            .iter()
            .all(|e| e.trigger != AnomalyTrigger::CriticalCrossing));
        let cycle = rules.evaluate(&history, &[clear], now);
        assert!(cycle.resolved.is_empty());
    }

    #[test]
    fn test_unknown_metric_skipped() {
        let history = AnomalyHistory::new();
        let rules = AnomalyClassifier::default();
        let evaluation = evaluate_at(tb_variance().with_value(f64::NAN), None);

        let cycle = rules.evaluate(&history, &[evaluation], Utc::now());
        assert!(cycle.raised.is_empty());
        assert!(history.is_empty());
    }

    #[test]
    fn test_acknowledge() {
        let history = AnomalyHistory::new();
        let signal = ExternalSignal::new("ledger-reconciler", Severity::High, "TB mismatch")
            .in_category(MetricCategory::Financial)
            .integrity_critical();
        let event = history.record(from_signal(&signal, None).unwrap());
        assert!(event.financial_integrity_impact);

        let acked = history.acknowledge(event.id, Utc::now()).unwrap();
        assert!(acked.auto_resolved);
        assert_eq!(acked.resolution, Some(Resolution::Acknowledged));
        assert_eq!(history.open_count(), 0);

        assert!(matches!(
            history.acknowledge(AnomalyId::generate(), Utc::now()),
            Err(HealthError::AnomalyNotFound(_))
        ));
    }

    #[test]
    fn test_signal_requires_category() {
        let signal = ExternalSignal::new("pager", Severity::Low, "heads up");
        assert!(matches!(
            from_signal(&signal, None),
            Err(HealthError::InvalidSignal(_))
        ));

        let perf = ExternalSignal::new("pager", Severity::Low, "slow")
            .in_category(MetricCategory::Performance)
            .integrity_critical();
        assert!(!from_signal(&perf, None).unwrap().financial_integrity_impact);
    }

    #[test]
    fn test_list_newest_first_and_since() {
        let history = AnomalyHistory::new();
        let base = Utc::now();
        for minutes in [0, 10, 5] {
            let mut signal = ExternalSignal::new("ops", Severity::Low, format!("t+{}", minutes))
                .in_category(MetricCategory::Security);
            signal.timestamp = base + chrono::Duration::minutes(minutes);
            history.record(from_signal(&signal, None).unwrap());
        }

        let titles: Vec<String> = history.list(None).into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["t+10", "t+5", "t+0"]);

        let recent = history.list(Some(base + chrono::Duration::minutes(5)));
        assert_eq!(recent.len(), 2);
    }
}
