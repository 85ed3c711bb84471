//! Metric history store
//!
//! Single owner of every snapshot the engine has seen. Each monitored entity
//! gets its own bounded [`HistoryWindow`]; the scheduler is the only caller
//! that records into it.

mod window;

pub use window::HistoryWindow;
pub(crate) use window::older_than;

use crate::config::WindowConfig;
use crate::error::HistoryError;
use crate::models::{EntityRef, Snapshot};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Per-entity rolling windows of snapshots
#[derive(Debug)]
pub struct HistoryStore {
    config: WindowConfig,
    windows: HashMap<EntityRef, HistoryWindow>,
}

impl HistoryStore {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    /// Append a snapshot to its entity's window
    ///
    /// Fails with [`HistoryError::OutOfOrderSnapshot`] if the timestamp is not
    /// strictly after the newest recorded one. Rejected snapshots are never
    /// reordered into the window; the caller decides whether to drop them.
    pub fn record(&mut self, snapshot: Snapshot) -> Result<(), HistoryError> {
        let config = &self.config;
        self.windows
            .entry(snapshot.entity.clone())
            .or_insert_with(|| HistoryWindow::new(snapshot.entity.clone(), config))
            .push(snapshot)
    }

    /// Read-only view of an entity's window
    ///
    /// The borrow ends before the next `record`; clone the window for a
    /// stable copy.
    pub fn window(&self, entity: &EntityRef) -> Option<&HistoryWindow> {
        self.windows.get(entity)
    }

    /// Drop entities whose newest snapshot is older than `max_absence`
    pub fn evict_stale(&mut self, now: DateTime<Utc>, max_absence: Duration) -> Vec<EntityRef> {
        let mut evicted = Vec::new();

        self.windows.retain(|entity, window| {
            let keep = match window.latest() {
                Some(latest) => !older_than(now, latest.timestamp, max_absence),
                None => false,
            };
            if !keep {
                debug!(entity = %entity, "Evicting stale entity history");
                evicted.push(entity.clone());
            }
            keep
        });

        evicted.sort();
        evicted
    }

    /// Entities currently tracked, sorted
    pub fn entities(&self) -> Vec<EntityRef> {
        let mut entities: Vec<EntityRef> = self.windows.keys().cloned().collect();
        entities.sort();
        entities
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{EntityRef, EntityStatus, Snapshot};
    use chrono::{DateTime, TimeZone, Utc};

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    pub fn at(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }

    pub fn snapshot(entity: &EntityRef, secs: i64) -> Snapshot {
        Snapshot {
            entity: entity.clone(),
            timestamp: at(secs),
            cpu_ratio: 0.2,
            memory_ratio: 0.3,
            restart_count: 0,
            network_rx_bytes_per_sec: 1_000.0,
            network_tx_bytes_per_sec: 500.0,
            status: EntityStatus::Running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn store(max_samples: usize, max_age_secs: Option<u64>) -> HistoryStore {
        HistoryStore::new(WindowConfig {
            max_samples,
            max_age_secs,
        })
    }

    #[test]
    fn test_window_keeps_order_and_capacity() {
        let pod = EntityRef::pod("default", "api-7f9");
        let mut history = store(5, None);

        for i in 0..12 {
            assert_ok!(history.record(snapshot(&pod, i * 30)));
        }

        let window = history.window(&pod).unwrap();
        assert_eq!(window.len(), 5);

        let timestamps: Vec<_> = window.iter().map(|s| s.timestamp).collect();
        let expected: Vec<_> = (7..12).map(|i| at(i * 30)).collect();
        assert_eq!(timestamps, expected);
    }

    #[test]
    fn test_out_of_order_rejected_without_mutation() {
        let pod = EntityRef::pod("default", "api-7f9");
        let mut history = store(10, None);
        history.record(snapshot(&pod, 0)).unwrap();
        history.record(snapshot(&pod, 60)).unwrap();

        let before: Vec<_> = history.window(&pod).unwrap().iter().cloned().collect();

        let duplicate = history.record(snapshot(&pod, 60));
        assert!(matches!(
            duplicate,
            Err(HistoryError::OutOfOrderSnapshot { .. })
        ));

        let earlier = history.record(snapshot(&pod, 30));
        assert_err!(earlier);

        let after: Vec<_> = history.window(&pod).unwrap().iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_max_age_trims_old_snapshots() {
        let pod = EntityRef::pod("default", "api-7f9");
        let mut history = store(100, Some(120));

        for secs in [0, 60, 120, 180, 240] {
            history.record(snapshot(&pod, secs)).unwrap();
        }

        let window = history.window(&pod).unwrap();
        assert_eq!(window.oldest().unwrap().timestamp, at(120));
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_windows_are_per_entity() {
        let api = EntityRef::pod("default", "api-7f9");
        let node = EntityRef::node("worker-1");
        let mut history = store(10, None);

        history.record(snapshot(&api, 100)).unwrap();
        // Different entity, earlier timestamp: independent ordering
        history.record(snapshot(&node, 50)).unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history.window(&api).unwrap().len(), 1);
        assert_eq!(history.window(&node).unwrap().len(), 1);
        assert!(history.window(&EntityRef::pod("default", "missing")).is_none());
    }

    #[test]
    fn test_recent_and_within() {
        let pod = EntityRef::pod("default", "api-7f9");
        let mut history = store(10, None);
        for i in 0..6 {
            history.record(snapshot(&pod, i * 120)).unwrap();
        }
        let window = history.window(&pod).unwrap();

        let recent: Vec<_> = window.recent(2).map(|s| s.timestamp).collect();
        assert_eq!(recent, vec![at(480), at(600)]);

        let within: Vec<_> = window
            .within(Duration::from_secs(240))
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(within, vec![at(360), at(480), at(600)]);

        assert_eq!(window.recent(50).count(), 6);
    }

    #[test]
    fn test_evict_stale() {
        let api = EntityRef::pod("default", "api-7f9");
        let gone = EntityRef::pod("default", "gone-1");
        let mut history = store(10, None);

        history.record(snapshot(&gone, 0)).unwrap();
        history.record(snapshot(&api, 0)).unwrap();
        history.record(snapshot(&api, 200)).unwrap();

        let evicted = history.evict_stale(at(240), Duration::from_secs(90));
        assert_eq!(evicted, vec![gone.clone()]);
        assert_eq!(history.entities(), vec![api]);

        // Boundary: exactly max_absence old is kept
        let evicted = history.evict_stale(at(290), Duration::from_secs(90));
        assert!(evicted.is_empty());
    }
}
