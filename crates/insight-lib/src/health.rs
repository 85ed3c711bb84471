//! Engine health for liveness and readiness checks
//!
//! Each engine component reports a status after every cycle. The overall
//! status is the worst component status. The engine becomes ready once the
//! scheduler has completed a cycle and stays ready while no component is
//! unhealthy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Component status, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Partial failures, still serving findings
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the component entered its current status
    pub since: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            status,
            message,
            since: now,
            updated_at: now,
        }
    }

    /// Apply a new report, keeping `since` while the status is unchanged
    fn report(&mut self, status: ComponentStatus, message: Option<String>, now: DateTime<Utc>) {
        if self.status != status {
            self.since = now;
        }
        self.status = status;
        self.message = message;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub cycles_completed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    /// Cluster source listing and per-entity fetches
    pub const COLLECTOR: &str = "collector";
    /// Tick loop and cycle execution
    pub const SCHEDULER: &str = "scheduler";
    /// Finding aggregation and activity log
    pub const AGGREGATOR: &str = "aggregator";

    pub const ALL: [&str; 3] = [COLLECTOR, SCHEDULER, AGGREGATOR];
}

#[derive(Debug, Default)]
struct HealthState {
    components: BTreeMap<String, ComponentHealth>,
    cycles_completed: u64,
    last_cycle_at: Option<DateTime<Utc>>,
}

impl HealthState {
    fn overall(&self) -> ComponentStatus {
        self.components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Shared health state; clones observe the same components
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as healthy; re-registering resets it
    pub async fn register(&self, name: &str) {
        let now = Utc::now();
        self.state.write().await.components.insert(
            name.to_string(),
            ComponentHealth::new(ComponentStatus::Healthy, None, now),
        );
    }

    /// Register every engine component
    pub async fn register_all(&self) {
        for name in components::ALL {
            self.register(name).await;
        }
    }

    async fn report(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        match state.components.get_mut(name) {
            Some(component) => component.report(status, message, now),
            None => {
                state
                    .components
                    .insert(name.to_string(), ComponentHealth::new(status, message, now));
            }
        }
    }

    pub async fn set_healthy(&self, name: &str) {
        self.report(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.report(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.report(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Note a completed evaluation cycle; the first one makes the engine ready
    pub async fn record_cycle(&self, at: DateTime<Utc>) {
        let mut state = self.state.write().await;
        state.cycles_completed += 1;
        state.last_cycle_at = Some(at);
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: state.overall(),
            components: state.components.clone(),
            cycles_completed: state.cycles_completed,
            last_cycle_at: state.last_cycle_at,
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        if state.cycles_completed == 0 {
            return ReadinessResponse {
                ready: false,
                reason: Some("Engine has not completed its first cycle".to_string()),
            };
        }

        let failing: Vec<String> = state
            .components
            .iter()
            .filter(|(_, c)| !c.status.is_operational())
            .map(|(name, c)| match &c.message {
                Some(message) => format!("{}: {}", name, message),
                None => name.clone(),
            })
            .collect();

        if failing.is_empty() {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some(format!("Unhealthy: {}", failing.join(", "))),
            }
        }
    }
}
