//! Bounded, time-ordered snapshot window for one entity

use crate::config::WindowConfig;
use crate::error::HistoryError;
use crate::models::{EntityRef, Snapshot};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;

/// Ordered snapshots for a single entity, oldest first
///
/// Timestamps are strictly increasing. Capacity is bounded by a sample count
/// and, optionally, by age relative to the newest snapshot; whichever bound
/// is hit first evicts from the front.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    entity: EntityRef,
    snapshots: VecDeque<Snapshot>,
    max_samples: usize,
    max_age: Option<Duration>,
}

impl HistoryWindow {
    pub fn new(entity: EntityRef, config: &WindowConfig) -> Self {
        Self {
            entity,
            snapshots: VecDeque::with_capacity(config.max_samples.min(1024)),
            max_samples: config.max_samples.max(1),
            max_age: config.max_age(),
        }
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_samples
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn oldest(&self) -> Option<&Snapshot> {
        self.snapshots.front()
    }

    /// All snapshots, oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Snapshot> + ExactSizeIterator {
        self.snapshots.iter()
    }

    /// The `n` most recent snapshots, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Snapshot> {
        let skip = self.snapshots.len().saturating_sub(n);
        self.snapshots.iter().skip(skip)
    }

    /// Snapshots no older than `span` relative to the newest one, oldest first
    pub fn within(&self, span: Duration) -> impl Iterator<Item = &Snapshot> {
        let newest = self.latest().map(|s| s.timestamp);
        self.snapshots.iter().filter(move |s| match newest {
            Some(newest) => !older_than(newest, s.timestamp, span),
            None => false,
        })
    }

    /// Append a snapshot, enforcing ordering and capacity
    ///
    /// The window is left untouched when the snapshot is rejected.
    pub(crate) fn push(&mut self, snapshot: Snapshot) -> Result<(), HistoryError> {
        if let Some(latest) = self.snapshots.back() {
            if snapshot.timestamp <= latest.timestamp {
                return Err(HistoryError::OutOfOrderSnapshot {
                    entity: self.entity.clone(),
                    timestamp: snapshot.timestamp,
                    latest: latest.timestamp,
                });
            }
        }

        let newest = snapshot.timestamp;
        self.snapshots.push_back(snapshot);

        while self.snapshots.len() > self.max_samples {
            self.snapshots.pop_front();
        }

        if let Some(max_age) = self.max_age {
            while let Some(front) = self.snapshots.front() {
                if older_than(newest, front.timestamp, max_age) {
                    self.snapshots.pop_front();
                } else {
                    break;
                }
            }
        }

        Ok(())
    }
}

/// True when `then` lies strictly more than `span` before `now`
pub(crate) fn older_than(now: DateTime<Utc>, then: DateTime<Utc>, span: Duration) -> bool {
    match now.signed_duration_since(then).to_std() {
        Ok(age) => age > span,
        // `then` is in the future relative to `now`
        Err(_) => false,
    }
}
