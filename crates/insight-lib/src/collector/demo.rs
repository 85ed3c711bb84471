//! Synthetic cluster for demo mode
//!
//! Scripts a handful of workloads whose usage drifts into each anomaly the
//! engine knows about, so a dashboard has something to show without a live
//! cluster behind it. Every entity follows its own deterministic script
//! driven by how many times it has been fetched.

use super::ClusterSource;
use crate::error::EntityCollectionError;
use crate::models::{EntityRef, EntityStatus, Snapshot};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

/// Behaviour scripted for one demo entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    /// Ramps into sustained CPU saturation, then recovers
    CpuSaturation,
    /// Restarts every other fetch while crash-looping
    CrashLoop,
    /// Memory creeps up until a simulated OOM restart
    Leak,
    /// Steady traffic with a periodic inbound burst
    Bursty,
    /// Nothing interesting
    Steady,
}

/// Deterministic in-process cluster
pub struct DemoClusterSource {
    entities: Vec<(EntityRef, Script)>,
    ticks: DashMap<EntityRef, u64>,
}

impl Default for DemoClusterSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoClusterSource {
    pub fn new() -> Self {
        let entities = vec![
            (EntityRef::pod("web", "api-7f9"), Script::CpuSaturation),
            (EntityRef::pod("default", "worker-2"), Script::CrashLoop),
            (EntityRef::pod("data", "redis-master"), Script::Leak),
            (EntityRef::pod("kube-system", "ingress-nginx"), Script::Bursty),
            (EntityRef::node("worker-node-1"), Script::Steady),
        ];
        Self {
            entities,
            ticks: DashMap::new(),
        }
    }

    fn script(&self, entity: &EntityRef) -> Option<Script> {
        self.entities
            .iter()
            .find(|(e, _)| e == entity)
            .map(|(_, script)| *script)
    }

    /// Advance the entity's script and return the step just taken
    fn next_tick(&self, entity: &EntityRef) -> u64 {
        let mut tick = self.ticks.entry(entity.clone()).or_insert(0);
        let current = *tick;
        *tick += 1;
        current
    }
}

/// Small deterministic wobble in `[-amplitude/2, amplitude/2]`
fn wobble(tick: u64, amplitude: f64) -> f64 {
    let bucket = (tick.wrapping_mul(7919) % 11) as f64 / 10.0;
    (bucket - 0.5) * amplitude
}

fn usage(script: Script, tick: u64) -> Usage {
    match script {
        Script::CpuSaturation => {
            let phase = tick % 40;
            let cpu_ratio = match phase {
                0..=1 => 0.5 + 0.1 * phase as f64,
                2..=24 => 0.97,
                _ => 0.45 + wobble(tick, 0.1),
            };
            Usage {
                cpu_ratio,
                memory_ratio: 0.42 + wobble(tick, 0.04),
                ..Usage::quiet(tick)
            }
        }
        Script::CrashLoop => {
            let phase = tick % 60;
            let looping = phase < 30;
            // Counter keeps its value through the quiet half of each period
            let restart_count = (tick / 60) * 15 + phase.min(30) / 2;
            Usage {
                restart_count,
                status: if looping {
                    EntityStatus::CrashLooping
                } else {
                    EntityStatus::Running
                },
                ..Usage::quiet(tick)
            }
        }
        Script::Leak => {
            let phase = tick % 50;
            Usage {
                memory_ratio: 0.45 + 0.011 * phase as f64,
                restart_count: tick / 50,
                ..Usage::quiet(tick)
            }
        }
        Script::Bursty => {
            let burst = tick % 25 == 24;
            Usage {
                rx: if burst {
                    250_000.0
                } else {
                    20_000.0 + wobble(tick, 2_000.0)
                },
                tx: 8_000.0 + wobble(tick + 3, 800.0),
                ..Usage::quiet(tick)
            }
        }
        Script::Steady => Usage {
            cpu_ratio: 0.35 + wobble(tick, 0.06),
            memory_ratio: 0.55 + wobble(tick + 5, 0.04),
            ..Usage::quiet(tick)
        },
    }
}

struct Usage {
    cpu_ratio: f64,
    memory_ratio: f64,
    restart_count: u64,
    rx: f64,
    tx: f64,
    status: EntityStatus,
}

impl Usage {
    fn quiet(tick: u64) -> Self {
        Self {
            cpu_ratio: 0.25 + wobble(tick, 0.06),
            memory_ratio: 0.3 + wobble(tick + 1, 0.04),
            restart_count: 0,
            rx: 4_000.0 + wobble(tick + 2, 400.0),
            tx: 2_000.0 + wobble(tick + 4, 200.0),
            status: EntityStatus::Running,
        }
    }
}

#[async_trait]
impl ClusterSource for DemoClusterSource {
    async fn list_entities(&self) -> anyhow::Result<Vec<EntityRef>> {
        Ok(self.entities.iter().map(|(e, _)| e.clone()).collect())
    }

    async fn fetch_metrics(&self, entity: &EntityRef) -> Result<Snapshot, EntityCollectionError> {
        let script = self
            .script(entity)
            .ok_or_else(|| EntityCollectionError::NotFound {
                entity: entity.clone(),
            })?;

        let tick = self.next_tick(entity);
        let usage = usage(script, tick);
        debug!(entity = %entity, tick, "Generated demo snapshot");

        Ok(Snapshot {
            entity: entity.clone(),
            timestamp: Utc::now(),
            cpu_ratio: usage.cpu_ratio,
            memory_ratio: usage.memory_ratio,
            restart_count: usage.restart_count,
            network_rx_bytes_per_sec: usage.rx,
            network_tx_bytes_per_sec: usage.tx,
            status: usage.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_lists_scripted_entities() {
        let source = DemoClusterSource::new();
        let entities = assert_ok!(source.list_entities().await);
        assert_eq!(entities.len(), 5);
        assert!(entities.contains(&EntityRef::pod("default", "worker-2")));
        assert!(entities.contains(&EntityRef::node("worker-node-1")));
    }

    #[tokio::test]
    async fn test_unknown_entity_not_found() {
        let source = DemoClusterSource::new();
        let err = assert_err!(source.fetch_metrics(&EntityRef::pod("x", "y")).await);
        assert!(matches!(err, EntityCollectionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_scripts_advance_per_entity() {
        let source = DemoClusterSource::new();
        let api = EntityRef::pod("web", "api-7f9");

        let mut cpu = Vec::new();
        for _ in 0..4 {
            cpu.push(assert_ok!(source.fetch_metrics(&api).await).cpu_ratio);
        }
        assert!((cpu[0] - 0.5).abs() < 1e-9);
        assert!((cpu[1] - 0.6).abs() < 1e-9);
        assert!((cpu[3] - 0.97).abs() < 1e-9);

        // Other entities keep their own counters
        let worker = EntityRef::pod("default", "worker-2");
        let first = assert_ok!(source.fetch_metrics(&worker).await);
        assert_eq!(first.restart_count, 0);
        assert_eq!(first.status, EntityStatus::CrashLooping);
    }

    #[test]
    fn test_restart_counter_never_decreases() {
        let counts: Vec<u64> = (0..200)
            .map(|t| usage(Script::CrashLoop, t).restart_count)
            .collect();
        assert!(counts.windows(2).all(|w| w[1] >= w[0]));
        assert!(counts[199] > counts[0]);
    }

    #[test]
    fn test_leak_rises_within_period() {
        let ratios: Vec<f64> = (0..50).map(|t| usage(Script::Leak, t).memory_ratio).collect();
        assert!(ratios.windows(2).all(|w| w[1] > w[0]));
        assert!(ratios[49] < 1.0);
    }

    #[test]
    fn test_wobble_bounded() {
        for tick in 0..100 {
            assert!(wobble(tick, 1.0).abs() <= 0.5 + 1e-9);
        }
    }
}
