//! Cluster metric sources
//!
//! The engine consumes metrics through [`ClusterSource`]. Implementations
//! talk to the cluster API (or synthesize data) and hand back one
//! [`Snapshot`] per entity per call.

mod demo;

pub use demo::DemoClusterSource;

use crate::error::EntityCollectionError;
use crate::models::{EntityRef, Snapshot};

pub use async_trait::async_trait;

/// Source of entities and their current resource usage
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// List every entity that should be monitored this cycle
    async fn list_entities(&self) -> anyhow::Result<Vec<EntityRef>>;

    /// Fetch the current usage of one entity
    async fn fetch_metrics(&self, entity: &EntityRef) -> Result<Snapshot, EntityCollectionError>;
}
