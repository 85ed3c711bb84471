//! Error types for the insight engine
//!
//! None of these are fatal once the engine is running: the scheduler
//! isolates them per entity, per evaluator and per tick.

use crate::models::EntityRef;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// History store integrity violations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    /// Snapshot timestamp is not strictly after the window's newest entry
    #[error("out-of-order snapshot for {entity}: {timestamp} is not after {latest}")]
    OutOfOrderSnapshot {
        entity: EntityRef,
        timestamp: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
}

/// Per-entity collection failure; the entity is skipped for one cycle
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntityCollectionError {
    #[error("metrics collection for {entity} timed out after {timeout:?}")]
    Timeout { entity: EntityRef, timeout: Duration },

    #[error("metrics for {entity} unavailable: {reason}")]
    Unavailable { entity: EntityRef, reason: String },

    #[error("entity {entity} no longer exists")]
    NotFound { entity: EntityRef },
}

impl EntityCollectionError {
    pub fn entity(&self) -> &EntityRef {
        match self {
            EntityCollectionError::Timeout { entity, .. }
            | EntityCollectionError::Unavailable { entity, .. }
            | EntityCollectionError::NotFound { entity } => entity,
        }
    }
}

/// Scheduler-level conditions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// A tick fired while the previous cycle was still running
    #[error("evaluation cycle still in flight, skipping tick")]
    Overlap,
}

/// Invalid engine configuration, rejected at startup
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is too large")]
    Overflow { field: &'static str },

    #[error("{field} must be within (0, 1], got {value}")]
    RatioOutOfRange { field: &'static str, value: f64 },

    #[error("{lower_field} ({lower}) must be below {upper_field} ({upper})")]
    Inverted {
        lower_field: &'static str,
        lower: f64,
        upper_field: &'static str,
        upper: f64,
    },
}
