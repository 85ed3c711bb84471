//! Core data models for the insight engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of monitored cluster object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Pod,
    Node,
    Deployment,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Pod => write!(f, "pod"),
            EntityKind::Node => write!(f, "node"),
            EntityKind::Deployment => write!(f, "deployment"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = ParseEntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pod" | "pods" | "po" => Ok(EntityKind::Pod),
            "node" | "nodes" | "no" => Ok(EntityKind::Node),
            "deployment" | "deployments" | "deploy" => Ok(EntityKind::Deployment),
            other => Err(ParseEntityError::UnknownKind(other.to_string())),
        }
    }
}

/// Identity of a monitored entity
///
/// Rendered as `namespace/kind/name`, or `kind/name` for cluster-scoped
/// objects such as nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub namespace: String,
    pub kind: EntityKind,
    pub name: String,
}

impl EntityRef {
    pub fn new(namespace: impl Into<String>, kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind,
            name: name.into(),
        }
    }

    pub fn pod(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(namespace, EntityKind::Pod, name)
    }

    pub fn deployment(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(namespace, EntityKind::Deployment, name)
    }

    /// Nodes are cluster-scoped and carry no namespace
    pub fn node(name: impl Into<String>) -> Self {
        Self::new(String::new(), EntityKind::Node, name)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
        }
    }
}

impl FromStr for EntityRef {
    type Err = ParseEntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let (namespace, kind, name) = match parts.as_slice() {
            [kind, name] => ("", *kind, *name),
            [namespace, kind, name] => (*namespace, *kind, *name),
            _ => return Err(ParseEntityError::Malformed(s.to_string())),
        };

        if name.is_empty() {
            return Err(ParseEntityError::Malformed(s.to_string()));
        }

        Ok(EntityRef::new(namespace, kind.parse()?, name))
    }
}

/// Failure to parse an entity reference from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseEntityError {
    #[error("unknown entity kind '{0}' (expected pod, node or deployment)")]
    UnknownKind(String),
    #[error("malformed entity '{0}' (expected kind/name or namespace/kind/name)")]
    Malformed(String),
}

/// Workload status reported alongside a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    #[default]
    Running,
    Pending,
    CrashLooping,
    Failed,
    Unknown,
}

/// Point-in-time resource usage of one entity
///
/// Produced once per collection cycle and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entity: EntityRef,
    pub timestamp: DateTime<Utc>,
    /// CPU usage as a fraction of the limit (or allocatable capacity for nodes)
    pub cpu_ratio: f64,
    /// Memory usage as a fraction of the limit
    pub memory_ratio: f64,
    /// Cumulative container restart count
    pub restart_count: u64,
    pub network_rx_bytes_per_sec: f64,
    pub network_tx_bytes_per_sec: f64,
    pub status: EntityStatus,
}

/// Finding severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Failure to parse a severity name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseSeverityError {
    #[error("unknown severity '{0}' (expected info, warning or critical)")]
    Unknown(String),
}

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "critical" | "crit" => Ok(Severity::Critical),
            other => Err(ParseSeverityError::Unknown(other.to_string())),
        }
    }
}

/// What kind of condition a finding describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    HighCpu,
    FrequentRestarts,
    MemoryLeak,
    NetworkIn,
    NetworkOut,
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingCategory::HighCpu => write!(f, "high_cpu"),
            FindingCategory::FrequentRestarts => write!(f, "frequent_restarts"),
            FindingCategory::MemoryLeak => write!(f, "memory_leak"),
            FindingCategory::NetworkIn => write!(f, "network_in"),
            FindingCategory::NetworkOut => write!(f, "network_out"),
        }
    }
}

/// Raw evaluator output before deduplication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingCandidate {
    pub detector: String,
    pub category: FindingCategory,
    pub entity: EntityRef,
    pub severity: Severity,
    pub message: String,
    pub recommendation: String,
    /// Timestamp of the newest snapshot that triggered the candidate
    pub observed_at: DateTime<Utc>,
}

impl FindingCandidate {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            detector: self.detector.clone(),
            entity: self.entity.clone(),
            category: self.category,
        }
    }
}

/// Identity of a recurring condition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub detector: String,
    pub entity: EntityRef,
    pub category: FindingCategory,
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.detector, self.entity, self.category)
    }
}

/// A deduplicated, tracked anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: u64,
    pub key: DedupKey,
    pub detector: String,
    pub category: FindingCategory,
    pub entity: EntityRef,
    pub severity: Severity,
    pub message: String,
    pub recommendation: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Number of candidates folded into this finding
    pub occurrences: u64,
}

/// Lifecycle transition produced by the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingEventKind {
    Opened,
    Escalated,
    Reaffirmed,
    Closed,
}

impl fmt::Display for FindingEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingEventKind::Opened => write!(f, "opened"),
            FindingEventKind::Escalated => write!(f, "escalated"),
            FindingEventKind::Reaffirmed => write!(f, "reaffirmed"),
            FindingEventKind::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingEvent {
    pub kind: FindingEventKind,
    pub finding: Finding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_display_namespaced_and_cluster_scoped() {
        assert_eq!(EntityRef::pod("default", "api-7f9").to_string(), "default/pod/api-7f9");
        assert_eq!(EntityRef::node("worker-1").to_string(), "node/worker-1");
    }

    #[test]
    fn test_entity_parse() {
        let pod: EntityRef = "default/pod/api-7f9".parse().unwrap();
        assert_eq!(pod, EntityRef::pod("default", "api-7f9"));

        let node: EntityRef = "node/worker-1".parse().unwrap();
        assert_eq!(node, EntityRef::node("worker-1"));

        let deploy: EntityRef = "shop/deploy/frontend".parse().unwrap();
        assert_eq!(deploy.kind, EntityKind::Deployment);
    }

    #[test]
    fn test_entity_parse_errors() {
        assert!(matches!(
            "default/cronjob/nightly".parse::<EntityRef>(),
            Err(ParseEntityError::UnknownKind(_))
        ));
        assert!(matches!(
            "just-a-name".parse::<EntityRef>(),
            Err(ParseEntityError::Malformed(_))
        ));
        assert!(matches!(
            "pod/".parse::<EntityRef>(),
            Err(ParseEntityError::Malformed(_))
        ));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
        assert_eq!("CRITICAL".parse::<Severity>(), Ok(Severity::Critical));
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_parse_error() {
        let err = "Fatal".parse::<Severity>().unwrap_err();
        assert_eq!(err, ParseSeverityError::Unknown("fatal".to_string()));
        assert_eq!(
            err.to_string(),
            "unknown severity 'fatal' (expected info, warning or critical)"
        );

        // Usable with anyhow and `?` in the binaries
        let wrapped: anyhow::Error = err.into();
        assert!(wrapped.to_string().contains("fatal"));
    }

    #[test]
    fn test_dedup_key_display() {
        let key = DedupKey {
            detector: "cpu_threshold".to_string(),
            entity: EntityRef::pod("default", "api-7f9"),
            category: FindingCategory::HighCpu,
        };
        assert_eq!(key.to_string(), "cpu_threshold:default/pod/api-7f9:high_cpu");
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
    }
}
