//! Evaluation pipeline.
//!
//! One cycle runs classify, drift, anomaly rules and scoring over the whole
//! store and publishes a new snapshot. Cycles are synchronous and serialized;
//! the scheduler decides when they run.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use vigil_types::{
    AnomalyEvent, AnomalyId, CategoryFilter, ClassifiedMetric, DriftLevel, DriftRecord,
    ExternalSignal, HealthSnapshot, Metric, MetricDefinition, MetricId, MetricStatus,
    Observation,
};

use crate::anomaly::{self, AnomalyClassifier, AnomalyHistory, MetricEvaluation};
use crate::classifier::StatusClassifier;
use crate::config::MonitorConfig;
use crate::drift::DriftDetector;
use crate::error::HealthResult;
use crate::ports::DefinitionRegistry;
use crate::scorer::CompositeScorer;
use crate::store::MetricStore;

/// Events emitted by the engine and its scheduler.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A cycle published a new snapshot.
    SnapshotPublished(HealthSnapshot),

    /// A metric's status differs from the previous cycle.
    StatusChanged {
        metric_id: MetricId,
        from: MetricStatus,
        to: MetricStatus,
    },

    AnomalyRaised(AnomalyEvent),

    /// Acknowledged, or its condition cleared.
    AnomalyResolved(AnomalyEvent),

    BaselineReset { metric_id: MetricId, baseline: f64 },

    /// A trigger arrived while a cycle was in flight and was dropped.
    EvaluationCoalesced,

    /// An on-demand evaluation exceeded its timeout.
    EvaluationTimedOut { timeout_ms: u64 },
}

/// The monitoring pipeline and the state it owns.
pub struct HealthEngine {
    config: MonitorConfig,
    store: MetricStore,
    history: AnomalyHistory,
    classifier: StatusClassifier,
    detector: DriftDetector,
    anomalies: AnomalyClassifier,
    scorer: CompositeScorer,

    /// Latest published snapshot.
    latest: RwLock<Option<HealthSnapshot>>,

    /// Classification behind the latest snapshot.
    classified: RwLock<Option<Vec<ClassifiedMetric>>>,

    /// Serializes cycles.
    evaluation: Mutex<()>,
    cycle: AtomicU64,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl HealthEngine {
    pub fn new(config: MonitorConfig) -> HealthResult<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(1024);

        Ok(Self {
            store: MetricStore::new(),
            history: AnomalyHistory::new(),
            classifier: StatusClassifier::new(config.classification.clone()),
            detector: DriftDetector::new(config.drift.clone()),
            anomalies: AnomalyClassifier::new(config.anomaly.clone()),
            scorer: CompositeScorer::new(config.scoring.clone()),
            latest: RwLock::new(None),
            classified: RwLock::new(None),
            evaluation: Mutex::new(()),
            cycle: AtomicU64::new(0),
            event_tx,
            config,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    pub fn history(&self) -> &AnomalyHistory {
        &self.history
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: MonitorEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn register(&self, definition: &MetricDefinition) -> HealthResult<Metric> {
        self.store.register(definition)
    }

    /// Register every definition from a registry. All definitions are
    /// validated before any is registered.
    pub fn load_definitions(&self, registry: &dyn DefinitionRegistry) -> HealthResult<usize> {
        let definitions = registry.definitions()?;
        for definition in &definitions {
            definition.validate()?;
        }
        for definition in &definitions {
            self.store.register(definition)?;
        }
        info!(count = definitions.len(), "Loaded metric definitions");
        Ok(definitions.len())
    }

    /// Apply one observation. Returns `false` if it was out of order.
    pub fn ingest(&self, observation: &Observation) -> HealthResult<bool> {
        self.store.ingest(observation)
    }

    /// Record an externally reported anomaly.
    #[instrument(skip(self, signal), fields(source = %signal.source))]
    pub fn ingest_signal(&self, signal: &ExternalSignal) -> HealthResult<AnomalyEvent> {
        let metric = match &signal.metric_id {
            Some(id) => Some(self.store.get(id)?),
            None => None,
        };
        let event = self.history.record(anomaly::from_signal(signal, metric.as_ref())?);
        info!(
            anomaly_id = %event.id,
            severity = %event.severity,
            "Anomaly raised from external signal"
        );
        self.emit(MonitorEvent::AnomalyRaised(event.clone()));
        Ok(event)
    }

    fn evaluate_metric(&self, metric: &Metric) -> MetricEvaluation {
        let prior = Metric {
            current_value: metric.previous_value,
            ..metric.clone()
        };

        MetricEvaluation {
            classified: self.classifier.classify_metric(metric),
            drift: self.detector.compute(metric),
            prior_status: self.classifier.classify_metric(&prior).status,
            prior_drift: self
                .detector
                .compute(&prior)
                .map(|d| d.level)
                .unwrap_or(DriftLevel::Stable),
        }
    }

    /// Run one evaluation cycle and publish its snapshot.
    ///
    /// A metric that cannot be classified is marked unknown and excluded
    /// from scoring; it never fails the cycle.
    #[instrument(skip(self))]
    pub fn run_cycle(&self) -> HealthSnapshot {
        let _serial = self.evaluation.lock();
        let now = Utc::now();
        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;

        self.store.begin_cycle();
        let evaluations: Vec<MetricEvaluation> = self
            .store
            .list(CategoryFilter::All)
            .iter()
            .map(|metric| self.evaluate_metric(metric))
            .collect();

        for evaluation in &evaluations {
            let classified = &evaluation.classified;
            let metric = &classified.metric;

            if !classified.is_known() && metric.current_value.is_some() {
                warn!(metric_id = %metric.id, "Metric value unusable, marked unknown");
            }
            if metric.previous_value.is_some() && evaluation.prior_status != classified.status {
                info!(
                    metric_id = %metric.id,
                    from = %evaluation.prior_status,
                    to = %classified.status,
                    "Metric status changed"
                );
                self.emit(MonitorEvent::StatusChanged {
                    metric_id: metric.id.clone(),
                    from: evaluation.prior_status,
                    to: classified.status,
                });
            }
        }

        let outcome = self.anomalies.evaluate(&self.history, &evaluations, now);

        let (classified, drift): (Vec<ClassifiedMetric>, Vec<Option<DriftRecord>>) = evaluations
            .into_iter()
            .map(|e| (e.classified, e.drift))
            .unzip();
        let drift: Vec<DriftRecord> = drift.into_iter().flatten().collect();

        let snapshot = self
            .scorer
            .score(&classified, &drift, &self.history.open(), cycle, now);
        *self.classified.write() = Some(classified);
        *self.latest.write() = Some(snapshot.clone());

        debug!(
            cycle,
            score = snapshot.composite_score,
            band = %snapshot.risk_band,
            raised = outcome.raised.len(),
            resolved = outcome.resolved.len(),
            "Evaluation cycle complete"
        );

        for event in outcome.raised {
            self.emit(MonitorEvent::AnomalyRaised(event));
        }
        for event in outcome.resolved {
            self.emit(MonitorEvent::AnomalyResolved(event));
        }
        self.emit(MonitorEvent::SnapshotPublished(snapshot.clone()));

        snapshot
    }

    /// Classified metrics in registration order, as of the latest cycle.
    ///
    /// Before the first cycle the stored values are classified directly.
    pub fn list_classified(&self, filter: CategoryFilter) -> Vec<ClassifiedMetric> {
        if let Some(classified) = self.classified.read().as_ref() {
            return classified
                .iter()
                .filter(|c| filter.matches(c.metric.category))
                .cloned()
                .collect();
        }
        self.store
            .list(filter)
            .iter()
            .map(|m| self.classifier.classify_metric(m))
            .collect()
    }

    /// Drift for every metric that has both a baseline and a usable value.
    pub fn list_drift(&self, filter: CategoryFilter) -> Vec<DriftRecord> {
        self.store
            .list(filter)
            .iter()
            .filter_map(|m| self.detector.compute(m))
            .collect()
    }

    /// Anomaly history, newest first.
    pub fn list_anomalies(&self, since: Option<DateTime<Utc>>) -> Vec<AnomalyEvent> {
        self.history.list(since)
    }

    pub fn reset_baseline(&self, metric_id: &MetricId) -> HealthResult<f64> {
        let baseline = self.store.reset_baseline(metric_id)?;
        self.emit(MonitorEvent::BaselineReset {
            metric_id: metric_id.clone(),
            baseline,
        });
        Ok(baseline)
    }

    pub fn acknowledge_anomaly(&self, id: AnomalyId) -> HealthResult<AnomalyEvent> {
        let was_open = self.history.get(id)?.is_open();
        let event = self.history.acknowledge(id, Utc::now())?;
        if was_open {
            self.emit(MonitorEvent::AnomalyResolved(event.clone()));
        }
        Ok(event)
    }

    pub fn last_snapshot(&self) -> Option<HealthSnapshot> {
        self.latest.read().clone()
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycle.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for HealthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthEngine")
            .field("metrics", &self.store.len())
            .field("anomalies", &self.history.len())
            .field("cycle", &self.cycles())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HealthError;
    use crate::ports::StaticRegistry;
    use vigil_types::{MetricCategory, Polarity, RiskBand, Severity, Trend};

    fn engine() -> HealthEngine {
        let engine = HealthEngine::new(MonitorConfig::default()).unwrap();
        let registry = StaticRegistry::default()
            .with_definition(MetricDefinition::new(
                "error_rate",
                MetricCategory::Performance,
                0.05,
                Polarity::HigherIsWorse,
            ))
            .with_definition(
                MetricDefinition::new(
                    "recon_rate",
                    MetricCategory::Financial,
                    98.0,
                    Polarity::HigherIsBetter,
                )
                .integrity_critical(),
            );
        engine.load_definitions(&registry).unwrap();
        engine
    }

    #[test]
    fn test_empty_cycle_scores_full_marks() {
        let engine = HealthEngine::new(MonitorConfig::default()).unwrap();
        let snapshot = engine.run_cycle();
        assert_eq!(snapshot.composite_score, 100);
        assert_eq!(snapshot.risk_band, RiskBand::Low);
        assert_eq!(snapshot.cycle, 1);
    }

    #[test]
    fn test_unobserved_metrics_are_unknown() {
        let engine = engine();
        let snapshot = engine.run_cycle();
        assert_eq!(snapshot.unknown_count, 2);
        assert_eq!(snapshot.composite_score, 100);
    }

    #[test]
    fn test_critical_metric_caps_band() {
        let engine = engine();
        engine.ingest(&Observation::new("error_rate", 0.02)).unwrap();
        engine.ingest(&Observation::new("recon_rate", 150.0)).unwrap();
        engine.run_cycle();

        engine.ingest(&Observation::new("error_rate", 0.051)).unwrap();
        let snapshot = engine.run_cycle();

        // critical metric, crossing and drift anomalies, significant drift
        assert_eq!(snapshot.critical_count, 1);
        assert_eq!(snapshot.unresolved_anomaly_count, 2);
        assert_eq!(snapshot.composite_score, 100 - 15 - 2 * 3 - 2);
        assert_eq!(snapshot.risk_band, RiskBand::Elevated);
        assert!(!snapshot.band_capped);

        let error_rate = &engine.list_classified(CategoryFilter::All)[0];
        assert_eq!(error_rate.status, MetricStatus::Critical);
        assert_eq!(error_rate.trend, Trend::Up);

        for event in engine.list_anomalies(None) {
            engine.acknowledge_anomaly(event.id).unwrap();
        }
        let snapshot = engine.run_cycle();
        assert_eq!(snapshot.unresolved_anomaly_count, 0);
        assert_eq!(snapshot.composite_score, 83);
        assert_eq!(snapshot.risk_band, RiskBand::Elevated);
        assert!(snapshot.band_capped);
    }

    #[test]
    fn test_listing_matches_latest_cycle() {
        let engine = engine();
        engine.ingest(&Observation::new("error_rate", 0.02)).unwrap();
        engine.run_cycle();

        // Arrives between cycles: not visible until the next one runs.
        engine.ingest(&Observation::new("error_rate", 0.06)).unwrap();
        let listed = engine.list_classified(CategoryFilter::Only(MetricCategory::Performance));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].metric.current_value, Some(0.02));
        assert_eq!(listed[0].status, MetricStatus::Healthy);

        let snapshot = engine.run_cycle();
        let listed = engine.list_classified(CategoryFilter::All);
        assert_eq!(listed[0].status, MetricStatus::Critical);
        assert_eq!(snapshot.critical_count, 1);
    }

    #[test]
    fn test_status_change_emits_event() {
        let engine = engine();
        let mut events = engine.subscribe();

        engine.ingest(&Observation::new("error_rate", 0.01)).unwrap();
        engine.run_cycle();
        engine.ingest(&Observation::new("error_rate", 0.06)).unwrap();
        engine.run_cycle();

        let mut changed = false;
        while let Ok(event) = events.try_recv() {
            if let MonitorEvent::StatusChanged { from, to, .. } = event {
                assert_eq!(from, MetricStatus::Healthy);
                assert_eq!(to, MetricStatus::Critical);
                changed = true;
            }
        }
        assert!(changed);
    }

    #[test]
    fn test_signal_for_unknown_metric() {
        let engine = engine();
        let signal = ExternalSignal::new("ledger", Severity::High, "mismatch").for_metric("nope");
        assert!(matches!(
            engine.ingest_signal(&signal),
            Err(HealthError::MetricNotFound(_))
        ));
    }

    #[test]
    fn test_signal_inherits_metric_tagging() {
        let engine = engine();
        let signal =
            ExternalSignal::new("ledger", Severity::High, "recon break").for_metric("recon_rate");
        let event = engine.ingest_signal(&signal).unwrap();

        assert_eq!(event.category, MetricCategory::Financial);
        assert!(event.financial_integrity_impact);
        assert_eq!(engine.run_cycle().unresolved_anomaly_count, 1);

        engine.acknowledge_anomaly(event.id).unwrap();
        assert_eq!(engine.run_cycle().unresolved_anomaly_count, 0);
    }

    #[test]
    fn test_reset_baseline_clears_drift() {
        let engine = engine();
        let id = MetricId::new("error_rate");
        engine.ingest(&Observation::new("error_rate", 0.01)).unwrap();
        engine.ingest(&Observation::new("error_rate", 0.02)).unwrap();
        assert!(engine.list_drift(CategoryFilter::All)[0].is_significant());

        assert_eq!(engine.reset_baseline(&id).unwrap(), 0.02);
        let drift = engine.list_drift(CategoryFilter::All);
        assert_eq!(drift[0].drift_percent, 0.0);
    }
}
