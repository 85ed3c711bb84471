//! Evaluation scheduler
//!
//! Drives the engine: on every tick it lists entities, fetches their metrics
//! concurrently, records snapshots, runs every evaluator over the entities
//! refreshed this cycle, folds the candidates into the aggregator and then
//! retires stale findings and entities.
//!
//! At most one cycle runs at a time. A tick that arrives while a cycle is in
//! flight is skipped, never queued.

use crate::anomaly::{
    default_evaluators, ActivityAction, AggregatorHandle, Evaluator, FindingAggregator,
};
use crate::collector::ClusterSource;
use crate::config::EngineConfig;
use crate::error::{EntityCollectionError, HistoryError, SchedulerError};
use crate::health::{components, HealthRegistry};
use crate::history::HistoryStore;
use crate::models::{EntityRef, FindingCandidate, FindingEvent, FindingEventKind, Snapshot};
use crate::observability::{EngineMetrics, StructuredLogger};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};


/// Outcome of one evaluation cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// Entity listing failed; nothing was fetched this cycle
    pub listing_failed: bool,
    pub entities_listed: usize,
    /// Entities whose fresh snapshot was recorded, sorted
    pub recorded: Vec<EntityRef>,
    pub collection_failures: Vec<EntityCollectionError>,
    pub rejected: Vec<HistoryError>,
    pub evaluator_failures: Vec<EvaluatorFailure>,
    pub candidates: usize,
    /// Every aggregator transition of the cycle, closures last
    pub events: Vec<FindingEvent>,
    pub evicted: Vec<EntityRef>,
    pub duration: Duration,
}

/// An evaluator that panicked on one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorFailure {
    pub detector: &'static str,
    pub entity: EntityRef,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            listing_failed: false,
            entities_listed: 0,
            recorded: Vec::new(),
            collection_failures: Vec::new(),
            rejected: Vec::new(),
            evaluator_failures: Vec::new(),
            candidates: 0,
            events: Vec::new(),
            evicted: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn events_of(&self, kind: FindingEventKind) -> impl Iterator<Item = &FindingEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}

/// Cycle state, owned by exactly one running cycle at a time
struct CycleRunner {
    source: Arc<dyn ClusterSource>,
    history: HistoryStore,
    evaluators: Vec<Box<dyn Evaluator>>,
    aggregator: AggregatorHandle,
    config: EngineConfig,
    health: HealthRegistry,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl CycleRunner {
    async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let start = Instant::now();
        let mut report = CycleReport::new(now);

        let entities = match self.source.list_entities().await {
            Ok(entities) => entities,
            Err(e) => {
                self.logger.log_listing_error(&e);
                report.listing_failed = true;
                Vec::new()
            }
        };
        report.entities_listed = entities.len();

        let snapshots = self.fetch_all(entities, &mut report).await;
        self.record_all(snapshots, &mut report);
        let candidates = self.evaluate_recorded(&mut report);
        report.candidates = candidates.len();

        self.aggregate(now, candidates, &mut report).await;

        report.evicted = self.history.evict_stale(now, self.config.max_absence());

        report.duration = start.elapsed();
        self.metrics.observe_cycle_duration(report.duration);
        self.metrics.set_entities_monitored(self.history.len());
        self.update_health(&report).await;

        debug!(
            entities = report.entities_listed,
            recorded = report.recorded.len(),
            failures = report.collection_failures.len(),
            candidates = report.candidates,
            events = report.events.len(),
            elapsed_ms = report.duration.as_millis(),
            "Evaluation cycle complete"
        );
        report
    }

    /// Fetch every entity concurrently, each under the collection timeout
    async fn fetch_all(&self, entities: Vec<EntityRef>, report: &mut CycleReport) -> Vec<Snapshot> {
        let timeout = self.config.collection_timeout();
        let mut tasks = JoinSet::new();

        for entity in entities {
            let source = Arc::clone(&self.source);
            tasks.spawn(async move {
                // Inner task so a panicking source is still attributed to its entity
                let fetch = tokio::spawn({
                    let entity = entity.clone();
                    async move { source.fetch_metrics(&entity).await }
                });
                let abort = fetch.abort_handle();
                match tokio::time::timeout(timeout, fetch).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => Err(EntityCollectionError::Unavailable {
                        entity,
                        reason: format!("metrics fetch failed: {}", e),
                    }),
                    Err(_) => {
                        abort.abort();
                        Err(EntityCollectionError::Timeout { entity, timeout })
                    }
                }
            });
        }

        let mut snapshots = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(snapshot)) => snapshots.push(snapshot),
                Ok(Err(e)) => report.collection_failures.push(e),
                Err(e) => {
                    warn!(error = %e, "Metric fetch task failed");
                    self.metrics.inc_collection_errors();
                }
            }
        }

        // Completion order is arbitrary; keep cycles reproducible
        snapshots.sort_by(|a, b| a.entity.cmp(&b.entity));
        report
            .collection_failures
            .sort_by(|a, b| a.entity().cmp(b.entity()));

        for error in &report.collection_failures {
            self.logger.log_collection_error(error);
            self.metrics.inc_collection_errors();
        }
        snapshots
    }

    fn record_all(&mut self, snapshots: Vec<Snapshot>, report: &mut CycleReport) {
        for snapshot in snapshots {
            let entity = snapshot.entity.clone();
            match self.history.record(snapshot) {
                Ok(()) => report.recorded.push(entity),
                Err(e) => {
                    warn!(entity = %entity, error = %e, "Rejected snapshot");
                    self.metrics.inc_snapshots_rejected();
                    report.rejected.push(e);
                }
            }
        }
    }

    /// Run every evaluator over the entities recorded this cycle
    fn evaluate_recorded(&self, report: &mut CycleReport) -> Vec<FindingCandidate> {
        let mut candidates = Vec::new();

        for entity in &report.recorded {
            let Some(window) = self.history.window(entity) else {
                continue;
            };

            for evaluator in &self.evaluators {
                match catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(window))) {
                    Ok(found) => candidates.extend(found),
                    Err(_) => {
                        let entity_label = entity.to_string();
                        self.logger.log_evaluator_panic(evaluator.name(), &entity_label);
                        self.metrics.inc_evaluator_failures(evaluator.name());
                        report.evaluator_failures.push(EvaluatorFailure {
                            detector: evaluator.name(),
                            entity: entity.clone(),
                        });
                    }
                }
            }
        }
        candidates
    }

    /// Fold candidates and faults into the aggregator under one write lock
    async fn aggregate(
        &self,
        now: DateTime<Utc>,
        candidates: Vec<FindingCandidate>,
        report: &mut CycleReport,
    ) {
        let mut aggregator = self.aggregator.write().await;

        if report.listing_failed {
            aggregator.record_fault(
                now,
                ActivityAction::CollectionFailed,
                None,
                None,
                "failed to list entities",
            );
        }
        for error in &report.collection_failures {
            aggregator.record_fault(
                now,
                ActivityAction::CollectionFailed,
                Some(error.entity().clone()),
                None,
                error.to_string(),
            );
        }
        for error in &report.rejected {
            let HistoryError::OutOfOrderSnapshot { entity, .. } = error;
            aggregator.record_fault(
                now,
                ActivityAction::SnapshotRejected,
                Some(entity.clone()),
                None,
                error.to_string(),
            );
        }
        for failure in &report.evaluator_failures {
            aggregator.record_fault(
                now,
                ActivityAction::EvaluatorFailed,
                Some(failure.entity.clone()),
                Some(failure.detector),
                format!("{} panicked while evaluating {}", failure.detector, failure.entity),
            );
        }

        for candidate in candidates {
            let event = aggregator.ingest(candidate);
            if event.kind == FindingEventKind::Opened {
                self.metrics.inc_findings_opened(&event.finding.detector);
            }
            self.logger.log_finding_event(&event);
            report.events.push(event);
        }

        for event in aggregator.retire_stale(now, self.config.grace_period()) {
            self.metrics.inc_findings_closed();
            self.logger.log_finding_event(&event);
            report.events.push(event);
        }

        aggregator.prune_activity(now);
        self.metrics.set_active_findings(aggregator.open_count());
    }

    async fn update_health(&self, report: &CycleReport) {
        if report.listing_failed {
            self.health
                .set_unhealthy(components::COLLECTOR, "Failed to list entities")
                .await;
        } else if !report.collection_failures.is_empty() {
            let message = format!(
                "{} of {} entities failed to collect",
                report.collection_failures.len(),
                report.entities_listed
            );
            self.health.set_degraded(components::COLLECTOR, message).await;
        } else {
            self.health.set_healthy(components::COLLECTOR).await;
        }

        if !report.evaluator_failures.is_empty() {
            let message = format!(
                "{} evaluator failure(s) last cycle",
                report.evaluator_failures.len()
            );
            self.health.set_degraded(components::AGGREGATOR, message).await;
        } else {
            self.health.set_healthy(components::AGGREGATOR).await;
        }

        self.health.set_healthy(components::SCHEDULER).await;
        self.health.record_cycle(report.started_at).await;
    }
}

/// Periodic driver with a single-flight guarantee
pub struct Scheduler {
    runner: Arc<Mutex<CycleRunner>>,
    interval: Duration,
    aggregator: AggregatorHandle,
    health: HealthRegistry,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Read side of the aggregator, for the API
    pub fn aggregator(&self) -> AggregatorHandle {
        self.aggregator.clone()
    }

    pub fn health(&self) -> HealthRegistry {
        self.health.clone()
    }

    /// Start a cycle in the background
    ///
    /// Fails with [`SchedulerError::Overlap`] without side effects if a
    /// cycle is already running.
    pub fn spawn_cycle(&self, now: DateTime<Utc>) -> Result<JoinHandle<CycleReport>, SchedulerError> {
        let mut guard = Arc::clone(&self.runner)
            .try_lock_owned()
            .map_err(|_| SchedulerError::Overlap)?;

        Ok(tokio::spawn(async move { guard.run_cycle(now).await }))
    }

    /// Run one cycle to completion
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, SchedulerError> {
        let mut guard = Arc::clone(&self.runner)
            .try_lock_owned()
            .map_err(|_| SchedulerError::Overlap)?;
        Ok(guard.run_cycle(now).await)
    }

    /// Tick until shutdown, then wait for the in-flight cycle
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting evaluation scheduler"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<CycleReport>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.spawn_cycle(Utc::now()) {
                        Ok(handle) => {
                            in_flight = Some(handle);
                        }
                        Err(e) => {
                            debug!(error = %e, "Tick skipped");
                            self.logger.log_cycle_skipped();
                            self.metrics.inc_ticks_skipped();
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down evaluation scheduler");
                    break;
                }
            }
        }

        if let Some(handle) = in_flight {
            if !handle.is_finished() {
                info!("Waiting for in-flight cycle to finish");
            }
            if let Err(e) = handle.await {
                warn!(error = %e, "In-flight cycle ended abnormally");
                self.health
                    .set_unhealthy(components::SCHEDULER, "Evaluation cycle aborted")
                    .await;
            }
        }
    }
}

/// Builder for the scheduler
pub struct SchedulerBuilder {
    source: Option<Arc<dyn ClusterSource>>,
    config: EngineConfig,
    evaluators: Option<Vec<Box<dyn Evaluator>>>,
    health: Option<HealthRegistry>,
    node_name: String,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            config: EngineConfig::default(),
            evaluators: None,
            health: None,
            node_name: "local".to_string(),
        }
    }

    pub fn source(mut self, source: Arc<dyn ClusterSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the evaluators built from the rule configuration
    pub fn evaluators(mut self, evaluators: Vec<Box<dyn Evaluator>>) -> Self {
        self.evaluators = Some(evaluators);
        self
    }

    /// Share a health registry with the API
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    pub fn build(self) -> Result<Scheduler> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Cluster source is required"))?;
        self.config.validate()?;

        let evaluators = self
            .evaluators
            .unwrap_or_else(|| default_evaluators(&self.config.rules));
        let aggregator = AggregatorHandle::new(FindingAggregator::new(&self.config.activity));
        let health = self.health.unwrap_or_default();
        let metrics = EngineMetrics::new();
        let logger = StructuredLogger::new(self.node_name);

        let runner = CycleRunner {
            source,
            history: HistoryStore::new(self.config.window.clone()),
            evaluators,
            aggregator: aggregator.clone(),
            config: self.config.clone(),
            health: health.clone(),
            metrics: metrics.clone(),
            logger: logger.clone(),
        };

        Ok(Scheduler {
            runner: Arc::new(Mutex::new(runner)),
            interval: self.config.collection_interval(),
            aggregator,
            health,
            metrics,
            logger,
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
