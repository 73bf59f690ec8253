//! Refresh scheduling.
//!
//! Evaluations are triggered by an interval timer or on demand. A gate
//! admits one evaluation at a time; a trigger that finds the gate closed is
//! dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use vigil_types::HealthSnapshot;

use crate::engine::{HealthEngine, MonitorEvent};
use crate::error::{HealthError, HealthResult};
use crate::ports::ObservationFeed;

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick or an on-demand trigger.
    Idle,
    /// A cycle is in flight.
    Evaluating,
    /// Auto-refresh is off; only on-demand evaluation runs.
    Dormant,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Evaluating => write!(f, "evaluating"),
            SchedulerState::Dormant => write!(f, "dormant"),
        }
    }
}

/// Result of a trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// This trigger ran a cycle.
    Evaluated(HealthSnapshot),
    /// A cycle was already in flight; nothing ran.
    Coalesced,
}

impl TriggerOutcome {
    pub fn snapshot(&self) -> Option<&HealthSnapshot> {
        match self {
            TriggerOutcome::Evaluated(snapshot) => Some(snapshot),
            TriggerOutcome::Coalesced => None,
        }
    }
}

fn current_runtime() -> HealthResult<Handle> {
    Handle::try_current()
        .map_err(|e| HealthError::Internal(format!("auto-refresh needs a runtime: {}", e)))
}

/// Holds the evaluation gate open until dropped.
struct GateGuard {
    gate: Arc<AtomicBool>,
}

impl GateGuard {
    fn acquire(gate: &Arc<AtomicBool>) -> Option<Self> {
        gate.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { gate: gate.clone() })
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gate.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy)]
struct AutoRefresh {
    enabled: bool,
    interval: Duration,
}

/// Drives evaluation cycles for one engine.
pub struct RefreshScheduler {
    engine: Arc<HealthEngine>,
    feed: Option<Arc<dyn ObservationFeed>>,
    gate: Arc<AtomicBool>,
    auto_refresh: RwLock<AutoRefresh>,
    evaluation_timeout: Duration,
    stale_factor: u32,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    /// Create a scheduler. The timer is not started until
    /// [`RefreshScheduler::start`] or [`RefreshScheduler::set_auto_refresh`].
    pub fn new(engine: Arc<HealthEngine>, feed: Option<Arc<dyn ObservationFeed>>) -> Arc<Self> {
        let refresh = engine.config().refresh.clone();
        Arc::new(Self {
            engine,
            feed,
            gate: Arc::new(AtomicBool::new(false)),
            auto_refresh: RwLock::new(AutoRefresh {
                enabled: refresh.auto_refresh,
                interval: refresh.interval(),
            }),
            evaluation_timeout: refresh.evaluation_timeout(),
            stale_factor: refresh.stale_factor,
            timer: Mutex::new(None),
        })
    }

    pub fn engine(&self) -> &Arc<HealthEngine> {
        &self.engine
    }

    pub fn state(&self) -> SchedulerState {
        if self.gate.load(Ordering::Acquire) {
            SchedulerState::Evaluating
        } else if self.auto_refresh.read().enabled {
            SchedulerState::Idle
        } else {
            SchedulerState::Dormant
        }
    }

    pub fn interval(&self) -> Duration {
        self.auto_refresh.read().interval
    }

    pub fn is_auto_refresh(&self) -> bool {
        self.auto_refresh.read().enabled
    }

    /// Age beyond which the latest snapshot is stale, for the current
    /// interval.
    pub fn stale_after(&self) -> Duration {
        self.interval() * self.stale_factor
    }

    /// Start the interval timer if auto-refresh is configured on. Must be
    /// called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> HealthResult<()> {
        if self.is_auto_refresh() {
            self.spawn_timer(&current_runtime()?);
        }
        Ok(())
    }

    /// Turn the interval timer on or off, optionally changing the interval.
    ///
    /// Disabling leaves the scheduler dormant; an in-flight cycle still
    /// completes.
    pub fn set_auto_refresh(
        self: &Arc<Self>,
        enabled: bool,
        interval: Option<Duration>,
    ) -> HealthResult<()> {
        if interval.is_some_and(|i| i.is_zero()) {
            return Err(HealthError::InvalidConfiguration(
                "refresh interval must be non-zero".to_string(),
            ));
        }

        // Resolve the runtime before touching any state so a failed enable
        // leaves the scheduler as it was.
        let runtime = if enabled {
            Some(current_runtime()?)
        } else {
            None
        };

        {
            let mut auto = self.auto_refresh.write();
            auto.enabled = enabled;
            if let Some(interval) = interval {
                auto.interval = interval;
            }
        }

        self.stop_timer();
        if let Some(runtime) = runtime {
            self.spawn_timer(&runtime);
        }
        info!(
            enabled,
            interval_ms = self.interval().as_millis() as u64,
            state = %self.state(),
            "Auto-refresh updated"
        );
        Ok(())
    }

    /// Stop the interval timer without changing the auto-refresh setting.
    pub fn shutdown(&self) {
        self.stop_timer();
    }

    fn stop_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    fn spawn_timer(self: &Arc<Self>, runtime: &Handle) {
        let period = self.interval();
        let weak: Weak<Self> = Arc::downgrade(self);

        let handle = runtime.spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let Some(scheduler) = weak.upgrade() else {
                    break;
                };
                match scheduler.trigger().await {
                    Ok(TriggerOutcome::Evaluated(snapshot)) => {
                        debug!(cycle = snapshot.cycle, "Scheduled evaluation complete");
                    }
                    Ok(TriggerOutcome::Coalesced) => {}
                    Err(e) => warn!(error = %e, "Scheduled evaluation failed"),
                }
            }
        });

        if let Some(previous) = self.timer.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Run one evaluation now, unless one is already in flight.
    ///
    /// Drains the observation feed first. Fails with
    /// [`HealthError::EvaluationTimeout`] carrying the last good snapshot if
    /// the cycle does not finish within the evaluation timeout; the cycle
    /// itself still runs to completion in the background.
    pub async fn trigger(&self) -> HealthResult<TriggerOutcome> {
        let Some(guard) = GateGuard::acquire(&self.gate) else {
            debug!("Evaluation in flight, coalescing trigger");
            self.engine.emit(MonitorEvent::EvaluationCoalesced);
            return Ok(TriggerOutcome::Coalesced);
        };

        match tokio::time::timeout(self.evaluation_timeout, self.evaluate(guard)).await {
            Ok(result) => result.map(TriggerOutcome::Evaluated),
            Err(_) => {
                let timeout_ms = self.evaluation_timeout.as_millis() as u64;
                warn!(timeout_ms, "Evaluation timed out");
                self.engine
                    .emit(MonitorEvent::EvaluationTimedOut { timeout_ms });
                Err(HealthError::EvaluationTimeout {
                    timeout_ms,
                    last_snapshot: self.engine.last_snapshot().map(Box::new),
                })
            }
        }
    }

    async fn evaluate(&self, guard: GateGuard) -> HealthResult<HealthSnapshot> {
        if let Some(feed) = &self.feed {
            let observations = feed.poll().await?;
            let mut applied = 0usize;
            for observation in &observations {
                match self.engine.ingest(observation) {
                    Ok(true) => applied += 1,
                    Ok(false) => {}
                    Err(e) => warn!(
                        metric_id = %observation.metric_id,
                        error = %e,
                        "Dropping observation"
                    ),
                }
            }
            debug!(received = observations.len(), applied, "Drained observation feed");
        }

        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            engine.run_cycle()
        })
        .await
        .map_err(|e| HealthError::Internal(format!("evaluation task failed: {}", e)))
    }

    /// Latest snapshot, or `StaleData` when it is older than
    /// `stale_factor × interval`.
    pub fn fresh_snapshot(&self) -> HealthResult<HealthSnapshot> {
        let snapshot = self
            .engine
            .last_snapshot()
            .ok_or(HealthError::NotEvaluated)?;

        let age_ms = snapshot.age_ms(chrono::Utc::now());
        if u128::from(age_ms) > self.stale_after().as_millis() {
            return Err(HealthError::StaleData {
                age_ms,
                last_snapshot: Some(Box::new(snapshot)),
            });
        }
        Ok(snapshot)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("state", &self.state())
            .field("interval", &self.interval())
            .field("evaluation_timeout", &self.evaluation_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::ports::QueueFeed;
    use vigil_types::{MetricCategory, MetricDefinition, Observation, Polarity};

    fn scheduler(auto_refresh: bool) -> (Arc<RefreshScheduler>, Arc<QueueFeed>) {
        let mut config = MonitorConfig::default();
        config.refresh.auto_refresh = auto_refresh;
        let engine = Arc::new(HealthEngine::new(config).unwrap());
        engine
            .register(&MetricDefinition::new(
                "latency",
                MetricCategory::Performance,
                250.0,
                Polarity::HigherIsWorse,
            ))
            .unwrap();
        let feed = Arc::new(QueueFeed::new());
        let scheduler =
            RefreshScheduler::new(engine, Some(feed.clone() as Arc<dyn ObservationFeed>));
        (scheduler, feed)
    }

    #[test]
    fn test_gate_admits_one() {
        let gate = Arc::new(AtomicBool::new(false));
        let first = GateGuard::acquire(&gate);
        assert!(first.is_some());
        assert!(GateGuard::acquire(&gate).is_none());
        drop(first);
        assert!(GateGuard::acquire(&gate).is_some());
    }

    #[test]
    fn test_failed_enable_leaves_scheduler_dormant() {
        let (scheduler, _feed) = scheduler(false);
        let result = scheduler.set_auto_refresh(true, Some(Duration::from_secs(5)));

        assert!(matches!(result, Err(HealthError::Internal(_))));
        assert_eq!(scheduler.state(), SchedulerState::Dormant);
        assert!(!scheduler.is_auto_refresh());
        assert_eq!(scheduler.interval(), Duration::from_secs(30));
        assert!(scheduler.timer.lock().is_none());
    }

    #[tokio::test]
    async fn test_trigger_drains_feed() {
        let (scheduler, feed) = scheduler(false);
        feed.push(Observation::new("latency", 120.0));

        let outcome = scheduler.trigger().await.unwrap();
        let snapshot = outcome.snapshot().unwrap();
        assert_eq!(snapshot.unknown_count, 0);
        assert_eq!(feed.pending(), 0);
        assert_eq!(scheduler.state(), SchedulerState::Dormant);
    }

    #[tokio::test]
    async fn test_feed_drops_unknown_metric() {
        let (scheduler, feed) = scheduler(false);
        feed.push(Observation::new("unregistered", 1.0));
        assert!(scheduler.trigger().await.is_ok());
    }

    #[tokio::test]
    async fn test_trigger_while_evaluating_is_coalesced() {
        let (scheduler, _feed) = scheduler(false);
        let _held = GateGuard::acquire(&scheduler.gate).unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Evaluating);

        let outcome = scheduler.trigger().await.unwrap();
        assert_eq!(outcome, TriggerOutcome::Coalesced);
        assert_eq!(scheduler.engine().cycles(), 0);
    }

    #[tokio::test]
    async fn test_fresh_snapshot_requires_evaluation() {
        let (scheduler, _feed) = scheduler(false);
        assert!(matches!(
            scheduler.fresh_snapshot(),
            Err(HealthError::NotEvaluated)
        ));
        scheduler.trigger().await.unwrap();
        assert!(scheduler.fresh_snapshot().is_ok());
    }

    #[tokio::test]
    async fn test_set_auto_refresh_transitions() {
        let (scheduler, _feed) = scheduler(false);
        assert_eq!(scheduler.state(), SchedulerState::Dormant);

        scheduler
            .set_auto_refresh(true, Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.interval(), Duration::from_secs(5));
        assert_eq!(scheduler.stale_after(), Duration::from_secs(10));

        scheduler.set_auto_refresh(false, None).unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Dormant);

        assert!(matches!(
            scheduler.set_auto_refresh(true, Some(Duration::ZERO)),
            Err(HealthError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_runs_cycles() {
        let (scheduler, _feed) = scheduler(false);
        let mut events = scheduler.engine().subscribe();
        scheduler
            .set_auto_refresh(true, Some(Duration::from_secs(30)))
            .unwrap();

        // first tick fires immediately, the second after one interval
        let mut published = 0;
        while published < 2 {
            if let Ok(MonitorEvent::SnapshotPublished(_)) = events.recv().await {
                published += 1;
            }
        }
        assert!(scheduler.engine().cycles() >= 2);

        scheduler.set_auto_refresh(false, None).unwrap();
        assert!(scheduler.timer.lock().is_none());
        assert!(!scheduler.is_auto_refresh());
    }
}
