//! Finding aggregation
//!
//! Handles:
//! - Deduplication of candidates by (detector, entity, category)
//! - Upward-only severity escalation while a finding is open
//! - Retirement of findings after a grace period without reaffirmation
//! - The activity log of lifecycle transitions

use super::activity::{ActivityAction, ActivityEntry, ActivityLog, NewEntry};
use crate::config::ActivityConfig;
use crate::history::older_than;
use crate::optimization::{recommend, Recommendation};
use crate::models::{
    DedupKey, EntityRef, Finding, FindingCandidate, FindingEvent, FindingEventKind, Severity,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockWriteGuard};

/// Filter for active findings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindingQuery {
    pub entity: Option<EntityRef>,
    /// Exact severity match
    pub severity: Option<Severity>,
}

impl FindingQuery {
    fn matches(&self, finding: &Finding) -> bool {
        self.entity.as_ref().map_or(true, |e| &finding.entity == e)
            && self.severity.map_or(true, |s| finding.severity == s)
    }
}

/// Owner of all findings and the activity log
#[derive(Debug)]
pub struct FindingAggregator {
    open: HashMap<DedupKey, Finding>,
    activity: ActivityLog,
    next_id: u64,
}

impl FindingAggregator {
    pub fn new(activity: &ActivityConfig) -> Self {
        Self {
            open: HashMap::new(),
            activity: ActivityLog::new(activity),
            next_id: 1,
        }
    }

    /// Fold a candidate into the open findings
    ///
    /// A recurring key bumps `last_seen` and escalates severity only upward;
    /// an unknown key opens a new finding.
    pub fn ingest(&mut self, candidate: FindingCandidate) -> FindingEvent {
        let key = candidate.dedup_key();

        if let Some(finding) = self.open.get_mut(&key) {
            if candidate.observed_at > finding.last_seen {
                finding.last_seen = candidate.observed_at;
            }
            finding.occurrences += 1;

            let kind = if candidate.severity > finding.severity {
                finding.severity = candidate.severity;
                finding.message = candidate.message;
                finding.recommendation = candidate.recommendation;
                FindingEventKind::Escalated
            } else {
                FindingEventKind::Reaffirmed
            };

            let event = FindingEvent {
                kind,
                finding: finding.clone(),
            };
            if kind == FindingEventKind::Escalated {
                self.log_transition(&event, candidate.observed_at);
            }
            return event;
        }

        let finding = Finding {
            id: self.next_id,
            key: key.clone(),
            detector: candidate.detector,
            category: candidate.category,
            entity: candidate.entity,
            severity: candidate.severity,
            message: candidate.message,
            recommendation: candidate.recommendation,
            first_seen: candidate.observed_at,
            last_seen: candidate.observed_at,
            occurrences: 1,
        };
        self.next_id += 1;
        self.open.insert(key, finding.clone());

        let event = FindingEvent {
            kind: FindingEventKind::Opened,
            finding,
        };
        self.log_transition(&event, event.finding.first_seen);
        event
    }

    /// Close findings with no reaffirming candidate for longer than `grace_period`
    pub fn retire_stale(&mut self, now: DateTime<Utc>, grace_period: Duration) -> Vec<FindingEvent> {
        let stale: Vec<DedupKey> = self
            .open
            .iter()
            .filter(|(_, f)| older_than(now, f.last_seen, grace_period))
            .map(|(k, _)| k.clone())
            .collect();

        let mut closed: Vec<FindingEvent> = stale
            .into_iter()
            .filter_map(|key| self.open.remove(&key))
            .map(|finding| FindingEvent {
                kind: FindingEventKind::Closed,
                finding,
            })
            .collect();
        closed.sort_by_key(|e| e.finding.id);

        for event in &closed {
            self.log_transition(event, now);
        }
        closed
    }

    /// Open findings, optionally for one entity, ranked most severe first
    pub fn active_findings(&self, entity: Option<&EntityRef>) -> Vec<Finding> {
        self.query(&FindingQuery {
            entity: entity.cloned(),
            severity: None,
        })
    }

    /// Open findings matching `query`, ranked most severe first
    pub fn query(&self, query: &FindingQuery) -> Vec<Finding> {
        let mut findings: Vec<Finding> = self
            .open
            .values()
            .filter(|f| query.matches(f))
            .cloned()
            .collect();
        rank(&mut findings);
        findings
    }

    pub fn activity_since(&self, since: Option<DateTime<Utc>>) -> Vec<ActivityEntry> {
        self.activity.since(since)
    }

    /// Surface an engine fault through the activity log
    pub fn record_fault(
        &mut self,
        at: DateTime<Utc>,
        action: ActivityAction,
        entity: Option<EntityRef>,
        detector: Option<&str>,
        description: impl Into<String>,
    ) {
        self.activity.append(NewEntry {
            timestamp: at,
            action,
            entity,
            detector: detector.map(str::to_string),
            severity: None,
            finding_id: None,
            description: description.into(),
        });
    }

    /// Apply activity retention
    pub fn prune_activity(&mut self, now: DateTime<Utc>) -> usize {
        self.activity.prune(now)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn log_transition(&mut self, event: &FindingEvent, at: DateTime<Utc>) {
        let action = match event.kind {
            FindingEventKind::Opened => ActivityAction::Opened,
            FindingEventKind::Escalated => ActivityAction::Escalated,
            FindingEventKind::Closed => ActivityAction::Closed,
            FindingEventKind::Reaffirmed => return,
        };
        let finding = &event.finding;

        let description = match event.kind {
            FindingEventKind::Closed => format!(
                "{} on {} resolved after {} occurrence(s)",
                finding.category, finding.entity, finding.occurrences
            ),
            _ => finding.message.clone(),
        };

        self.activity.append(NewEntry {
            timestamp: at,
            action,
            entity: Some(finding.entity.clone()),
            detector: Some(finding.detector.clone()),
            severity: Some(finding.severity),
            finding_id: Some(finding.id),
            description,
        });
    }
}

/// Severity descending, then oldest first
fn rank(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(a.first_seen.cmp(&b.first_seen))
            .then(a.id.cmp(&b.id))
    });
}

/// Shared handle to the aggregator
///
/// Readers get cloned snapshots under a short read lock. Writes are
/// crate-private: the scheduler cycle is the single writer.
#[derive(Debug, Clone)]
pub struct AggregatorHandle {
    inner: Arc<RwLock<FindingAggregator>>,
}

impl AggregatorHandle {
    pub fn new(aggregator: FindingAggregator) -> Self {
        Self {
            inner: Arc::new(RwLock::new(aggregator)),
        }
    }

    pub async fn findings(&self, query: &FindingQuery) -> Vec<Finding> {
        self.inner.read().await.query(query)
    }

    pub async fn activity(&self, since: Option<DateTime<Utc>>) -> Vec<ActivityEntry> {
        self.inner.read().await.activity_since(since)
    }

    pub async fn open_count(&self) -> usize {
        self.inner.read().await.open_count()
    }

    /// Recommendations for every active finding
    pub async fn recommendations(&self) -> Vec<Recommendation> {
        recommend(&self.inner.read().await.active_findings(None))
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, FindingAggregator> {
        self.inner.write().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::test_support::at;
    use crate::models::FindingCategory;

    fn aggregator() -> FindingAggregator {
        FindingAggregator::new(&ActivityConfig::default())
    }

    fn cpu_candidate(entity: &EntityRef, secs: i64, severity: Severity) -> FindingCandidate {
        FindingCandidate {
            detector: "cpu_threshold".to_string(),
            category: FindingCategory::HighCpu,
            entity: entity.clone(),
            severity,
            message: format!("cpu {} at {}", severity, secs),
            recommendation: "scale out".to_string(),
            observed_at: at(secs),
        }
    }

    #[test]
    fn test_first_candidate_opens() {
        let mut agg = aggregator();
        let pod = EntityRef::pod("default", "api-7f9");

        let event = agg.ingest(cpu_candidate(&pod, 0, Severity::Warning));
        assert_eq!(event.kind, FindingEventKind::Opened);
        assert_eq!(event.finding.id, 1);
        assert_eq!(event.finding.first_seen, at(0));
        assert_eq!(agg.open_count(), 1);
        assert_eq!(agg.activity_since(None).len(), 1);
    }

    #[test]
    fn test_same_key_twice_is_idempotent() {
        let mut agg = aggregator();
        let pod = EntityRef::pod("default", "api-7f9");

        agg.ingest(cpu_candidate(&pod, 0, Severity::Warning));
        let second = agg.ingest(cpu_candidate(&pod, 30, Severity::Warning));

        assert_eq!(second.kind, FindingEventKind::Reaffirmed);
        assert_eq!(agg.open_count(), 1);

        let finding = &agg.active_findings(Some(&pod))[0];
        assert_eq!(finding.first_seen, at(0));
        assert_eq!(finding.last_seen, at(30));
        assert_eq!(finding.severity, Severity::Warning);
        assert_eq!(finding.message, "cpu warning at 0");
        // Reaffirmations do not reach the activity log
        assert_eq!(agg.activity_since(None).len(), 1);
    }

    #[test]
    fn test_escalates_but_never_downgrades() {
        let mut agg = aggregator();
        let pod = EntityRef::pod("default", "api-7f9");

        agg.ingest(cpu_candidate(&pod, 0, Severity::Warning));
        let up = agg.ingest(cpu_candidate(&pod, 30, Severity::Critical));
        assert_eq!(up.kind, FindingEventKind::Escalated);
        assert_eq!(up.finding.severity, Severity::Critical);

        let down = agg.ingest(cpu_candidate(&pod, 60, Severity::Warning));
        assert_eq!(down.kind, FindingEventKind::Reaffirmed);
        assert_eq!(down.finding.severity, Severity::Critical);
        assert_eq!(down.finding.occurrences, 3);

        let actions: Vec<_> = agg.activity_since(None).iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![ActivityAction::Opened, ActivityAction::Escalated]);
    }

    #[test]
    fn test_last_seen_never_moves_backwards() {
        let mut agg = aggregator();
        let pod = EntityRef::pod("default", "api-7f9");

        agg.ingest(cpu_candidate(&pod, 60, Severity::Warning));
        let event = agg.ingest(cpu_candidate(&pod, 30, Severity::Warning));
        assert_eq!(event.finding.last_seen, at(60));
    }

    #[test]
    fn test_distinct_keys_are_separate_findings() {
        let mut agg = aggregator();
        let api = EntityRef::pod("default", "api-7f9");
        let worker = EntityRef::pod("default", "worker-2");

        agg.ingest(cpu_candidate(&api, 0, Severity::Warning));
        agg.ingest(cpu_candidate(&worker, 0, Severity::Critical));

        let mut restart = cpu_candidate(&api, 0, Severity::Warning);
        restart.detector = "restart_rate".to_string();
        restart.category = FindingCategory::FrequentRestarts;
        agg.ingest(restart);

        assert_eq!(agg.open_count(), 3);
        assert_eq!(agg.active_findings(Some(&api)).len(), 2);

        // Ranked: critical first
        let all = agg.active_findings(None);
        assert_eq!(all[0].entity, worker);
        assert_eq!(all[0].severity, Severity::Critical);
    }

    #[test]
    fn test_query_by_severity() {
        let mut agg = aggregator();
        let api = EntityRef::pod("default", "api-7f9");
        let worker = EntityRef::pod("default", "worker-2");
        agg.ingest(cpu_candidate(&api, 0, Severity::Warning));
        agg.ingest(cpu_candidate(&worker, 0, Severity::Critical));

        let critical = agg.query(&FindingQuery {
            entity: None,
            severity: Some(Severity::Critical),
        });
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].entity, worker);

        let none = agg.query(&FindingQuery {
            entity: Some(api),
            severity: Some(Severity::Critical),
        });
        assert!(none.is_empty());
    }

    #[test]
    fn test_retire_after_grace_exactly_once() {
        let mut agg = aggregator();
        let pod = EntityRef::pod("default", "api-7f9");
        let grace = Duration::from_secs(120);

        agg.ingest(cpu_candidate(&pod, 0, Severity::Warning));

        // Exactly at the grace boundary: still open
        assert!(agg.retire_stale(at(120), grace).is_empty());

        let closed = agg.retire_stale(at(121), grace);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].kind, FindingEventKind::Closed);
        assert_eq!(agg.open_count(), 0);

        assert!(agg.retire_stale(at(500), grace).is_empty());

        let closes = agg
            .activity_since(None)
            .iter()
            .filter(|e| e.action == ActivityAction::Closed)
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_retriggered_after_close_opens_new_finding() {
        let mut agg = aggregator();
        let pod = EntityRef::pod("default", "api-7f9");

        let first = agg.ingest(cpu_candidate(&pod, 0, Severity::Warning));
        agg.retire_stale(at(1_000), Duration::from_secs(60));

        let again = agg.ingest(cpu_candidate(&pod, 1_030, Severity::Warning));
        assert_eq!(again.kind, FindingEventKind::Opened);
        assert_ne!(again.finding.id, first.finding.id);
        assert_eq!(again.finding.occurrences, 1);
    }

    #[test]
    fn test_reaffirmed_finding_is_not_retired() {
        let mut agg = aggregator();
        let pod = EntityRef::pod("default", "api-7f9");
        let grace = Duration::from_secs(120);

        agg.ingest(cpu_candidate(&pod, 0, Severity::Warning));
        agg.ingest(cpu_candidate(&pod, 100, Severity::Warning));
        assert!(agg.retire_stale(at(200), grace).is_empty());
    }

    #[test]
    fn test_faults_recorded_in_activity() {
        let mut agg = aggregator();
        let pod = EntityRef::pod("default", "api-7f9");
        agg.record_fault(
            at(0),
            ActivityAction::CollectionFailed,
            Some(pod.clone()),
            None,
            "timed out",
        );

        let entries = agg.activity_since(None);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].action.is_fault());
        assert_eq!(entries[0].entity, Some(pod));
    }

    #[tokio::test]
    async fn test_handle_returns_snapshots() {
        let handle = AggregatorHandle::new(aggregator());
        let pod = EntityRef::pod("default", "api-7f9");

        handle
            .write()
            .await
            .ingest(cpu_candidate(&pod, 0, Severity::Warning));

        let findings = handle.findings(&FindingQuery::default()).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(handle.open_count().await, 1);
        assert_eq!(handle.activity(Some(at(0))).await.len(), 1);
        assert_eq!(handle.recommendations().await.len(), 1);
    }
}
