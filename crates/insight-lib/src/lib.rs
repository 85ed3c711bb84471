//! Anomaly detection engine for a Kubernetes dashboard
//!
//! This crate provides the core functionality for:
//! - Bounded per-entity metric history
//! - Rule evaluators (CPU, restarts, memory trend, network)
//! - Finding deduplication, escalation and retirement
//! - The collection and evaluation scheduler
//! - Optimization recommendations
//! - Health checks and observability

pub mod anomaly;
pub mod collector;
pub mod config;
pub mod error;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod optimization;
pub mod scheduler;

pub use anomaly::{ActivityAction, ActivityEntry, AggregatorHandle, Evaluator, FindingQuery};
pub use collector::{ClusterSource, DemoClusterSource};
pub use config::EngineConfig;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use optimization::{Priority, Recommendation};
pub use scheduler::{CycleReport, Scheduler, SchedulerBuilder};
