//! Append-only activity log
//!
//! Records finding lifecycle transitions and engine faults in time order,
//! bounded by entry count and age.

use crate::config::ActivityConfig;
use crate::history::older_than;
use crate::models::{EntityRef, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Opened,
    Escalated,
    Closed,
    CollectionFailed,
    SnapshotRejected,
    EvaluatorFailed,
}

impl ActivityAction {
    /// Whether the entry records an engine fault rather than a finding transition
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            ActivityAction::CollectionFailed
                | ActivityAction::SnapshotRejected
                | ActivityAction::EvaluatorFailed
        )
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ActivityAction::Opened => "opened",
            ActivityAction::Escalated => "escalated",
            ActivityAction::Closed => "closed",
            ActivityAction::CollectionFailed => "collection_failed",
            ActivityAction::SnapshotRejected => "snapshot_rejected",
            ActivityAction::EvaluatorFailed => "evaluator_failed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Monotonic position in the log, never reused
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub action: ActivityAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finding_id: Option<u64>,
    pub description: String,
}

/// Fields of a new entry; the log assigns sequence and clamps the timestamp
#[derive(Debug, Clone)]
pub(crate) struct NewEntry {
    pub timestamp: DateTime<Utc>,
    pub action: ActivityAction,
    pub entity: Option<EntityRef>,
    pub detector: Option<String>,
    pub severity: Option<Severity>,
    pub finding_id: Option<u64>,
    pub description: String,
}

/// Bounded, time-ordered log of activity entries
#[derive(Debug)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    next_sequence: u64,
    max_entries: usize,
    max_age: Option<Duration>,
}

impl ActivityLog {
    pub fn new(config: &ActivityConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            next_sequence: 1,
            max_entries: config.max_entries.max(1),
            max_age: config.max_age(),
        }
    }

    /// Append an entry
    ///
    /// A timestamp earlier than the newest entry is raised to it so the log
    /// stays time-ordered.
    pub(crate) fn append(&mut self, new: NewEntry) -> &ActivityEntry {
        let timestamp = match self.entries.back() {
            Some(last) if new.timestamp < last.timestamp => last.timestamp,
            _ => new.timestamp,
        };

        let entry = ActivityEntry {
            sequence: self.next_sequence,
            timestamp,
            action: new.action,
            entity: new.entity,
            detector: new.detector,
            severity: new.severity,
            finding_id: new.finding_id,
            description: new.description,
        };
        self.next_sequence += 1;
        self.entries.push_back(entry);

        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }

        &self.entries[self.entries.len() - 1]
    }

    /// Drop entries older than the retention age
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let Some(max_age) = self.max_age else {
            return 0;
        };

        let before = self.entries.len();
        while let Some(front) = self.entries.front() {
            if older_than(now, front.timestamp, max_age) {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        before - self.entries.len()
    }

    /// Entries at or after `since` (all entries when `None`), oldest first
    pub fn since(&self, since: Option<DateTime<Utc>>) -> Vec<ActivityEntry> {
        match since {
            None => self.entries.iter().cloned().collect(),
            Some(since) => {
                // Entries are time-ordered, so binary search the start
                let start = self.entries.partition_point(|e| e.timestamp < since);
                self.entries.range(start..).cloned().collect()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
