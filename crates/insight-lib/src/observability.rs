//! Observability infrastructure for the insight engine
//!
//! Provides:
//! - Prometheus metrics (cycle duration, monitored entities, finding churn, faults)
//! - Structured JSON logging with tracing

use crate::error::EntityCollectionError;
use crate::models::{FindingEvent, FindingEventKind, Severity};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Histogram buckets for cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    cycle_duration_seconds: Histogram,
    entities_monitored: IntGauge,
    active_findings: IntGauge,
    findings_opened: IntCounterVec,
    findings_closed: IntCounter,
    collection_errors: IntCounter,
    snapshots_rejected: IntCounter,
    ticks_skipped: IntCounter,
    evaluator_failures: IntCounterVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "insight_cycle_duration_seconds",
                "Time spent in one collect-evaluate-aggregate cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            entities_monitored: register_int_gauge!(
                "insight_entities_monitored",
                "Number of entities with a live history window"
            )
            .expect("Failed to register entities_monitored"),

            active_findings: register_int_gauge!(
                "insight_active_findings",
                "Number of currently open findings"
            )
            .expect("Failed to register active_findings"),

            findings_opened: register_int_counter_vec!(
                "insight_findings_opened_total",
                "Findings opened, by detector",
                &["detector"]
            )
            .expect("Failed to register findings_opened"),

            findings_closed: register_int_counter!(
                "insight_findings_closed_total",
                "Findings retired after the grace period"
            )
            .expect("Failed to register findings_closed"),

            collection_errors: register_int_counter!(
                "insight_collection_errors_total",
                "Per-entity metric collection failures, timeouts included"
            )
            .expect("Failed to register collection_errors"),

            snapshots_rejected: register_int_counter!(
                "insight_snapshots_rejected_total",
                "Snapshots rejected for out-of-order timestamps"
            )
            .expect("Failed to register snapshots_rejected"),

            ticks_skipped: register_int_counter!(
                "insight_ticks_skipped_total",
                "Scheduler ticks skipped because a cycle was still running"
            )
            .expect("Failed to register ticks_skipped"),

            evaluator_failures: register_int_counter_vec!(
                "insight_evaluator_failures_total",
                "Evaluator panics caught during a cycle, by detector",
                &["detector"]
            )
            .expect("Failed to register evaluator_failures"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (registers global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_cycle_duration(&self, elapsed: Duration) {
        self.inner().cycle_duration_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn set_entities_monitored(&self, count: usize) {
        self.inner().entities_monitored.set(count as i64);
    }

    pub fn set_active_findings(&self, count: usize) {
        self.inner().active_findings.set(count as i64);
    }

    pub fn inc_findings_opened(&self, detector: &str) {
        self.inner()
            .findings_opened
            .with_label_values(&[detector])
            .inc();
    }

    pub fn inc_findings_closed(&self) {
        self.inner().findings_closed.inc();
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    pub fn inc_snapshots_rejected(&self) {
        self.inner().snapshots_rejected.inc();
    }

    pub fn inc_ticks_skipped(&self) {
        self.inner().ticks_skipped.inc();
    }

    pub fn inc_evaluator_failures(&self, detector: &str) {
        self.inner()
            .evaluator_failures
            .with_label_values(&[detector])
            .inc();
    }
}

/// Structured logger for engine events
///
/// Emits one JSON-friendly event per finding transition and per fault so
/// log pipelines can key on the `event` field.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log a finding lifecycle transition; reaffirmations stay at debug
    pub fn log_finding_event(&self, event: &FindingEvent) {
        let finding = &event.finding;
        match event.kind {
            FindingEventKind::Opened | FindingEventKind::Escalated => {
                let name = if event.kind == FindingEventKind::Opened {
                    "finding_opened"
                } else {
                    "finding_escalated"
                };
                if finding.severity == Severity::Critical {
                    warn!(
                        event = name,
                        node = %self.node_name,
                        finding_id = finding.id,
                        entity = %finding.entity,
                        detector = %finding.detector,
                        category = %finding.category,
                        severity = %finding.severity,
                        details = %finding.message,
                        "Critical finding"
                    );
                } else {
                    info!(
                        event = name,
                        node = %self.node_name,
                        finding_id = finding.id,
                        entity = %finding.entity,
                        detector = %finding.detector,
                        category = %finding.category,
                        severity = %finding.severity,
                        details = %finding.message,
                        "Finding"
                    );
                }
            }
            FindingEventKind::Reaffirmed => {
                debug!(
                    event = "finding_reaffirmed",
                    node = %self.node_name,
                    finding_id = finding.id,
                    entity = %finding.entity,
                    occurrences = finding.occurrences,
                    "Finding reaffirmed"
                );
            }
            FindingEventKind::Closed => {
                info!(
                    event = "finding_closed",
                    node = %self.node_name,
                    finding_id = finding.id,
                    entity = %finding.entity,
                    detector = %finding.detector,
                    category = %finding.category,
                    occurrences = finding.occurrences,
                    last_seen = %finding.last_seen,
                    "Finding closed"
                );
            }
        }
    }

    pub fn log_collection_error(&self, error: &EntityCollectionError) {
        warn!(
            event = "collection_failed",
            node = %self.node_name,
            entity = %error.entity(),
            error = %error,
            "Metric collection failed, keeping stale window"
        );
    }

    pub fn log_listing_error(&self, error: &anyhow::Error) {
        warn!(
            event = "entity_listing_failed",
            node = %self.node_name,
            error = %error,
            "Failed to list entities"
        );
    }

    pub fn log_cycle_skipped(&self) {
        warn!(
            event = "tick_skipped",
            node = %self.node_name,
            "Previous evaluation cycle still running, skipping tick"
        );
    }

    pub fn log_evaluator_panic(&self, detector: &str, entity: &str) {
        warn!(
            event = "evaluator_failed",
            node = %self.node_name,
            detector = %detector,
            entity = %entity,
            "Evaluator panicked, skipping it for this entity"
        );
    }

    pub fn log_startup(&self, version: &str, entities: usize, interval: Duration) {
        info!(
            event = "engine_started",
            node = %self.node_name,
            engine_version = %version,
            entities = entities,
            interval_secs = interval.as_secs(),
            "Insight engine started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Insight engine shutting down"
        );
    }
}
