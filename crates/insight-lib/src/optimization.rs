//! Optimization recommendations derived from active findings
//!
//! Every open finding maps to one prioritized action plus a read-only
//! `kubectl` command an operator can run to confirm the diagnosis. The
//! commands are text only and never executed by the engine.

use crate::models::{EntityKind, EntityRef, Finding, FindingCategory, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Expected impact of acting on a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub finding_id: u64,
    pub entity: EntityRef,
    pub category: FindingCategory,
    pub priority: Priority,
    pub title: String,
    pub action: String,
    pub diagnostic_command: String,
}

/// Build one recommendation per finding, highest priority first
pub fn recommend(findings: &[Finding]) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = findings
        .iter()
        .map(|finding| Recommendation {
            finding_id: finding.id,
            entity: finding.entity.clone(),
            category: finding.category,
            priority: priority(finding),
            title: title(finding),
            action: finding.recommendation.clone(),
            diagnostic_command: diagnostic_command(finding.category, &finding.entity),
        })
        .collect();

    recommendations.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.entity.cmp(&b.entity))
            .then(a.finding_id.cmp(&b.finding_id))
    });
    recommendations
}

fn priority(finding: &Finding) -> Priority {
    match (finding.severity, finding.category) {
        (Severity::Critical, _) => Priority::High,
        // A leak only gets worse until the OOM killer steps in
        (Severity::Warning, FindingCategory::MemoryLeak) => Priority::High,
        (Severity::Warning, _) => Priority::Medium,
        (Severity::Info, _) => Priority::Low,
    }
}

fn title(finding: &Finding) -> String {
    let subject = &finding.entity.name;
    match finding.category {
        FindingCategory::HighCpu => format!("Relieve CPU pressure on {}", subject),
        FindingCategory::FrequentRestarts => format!("Stabilize restarting {}", subject),
        FindingCategory::MemoryLeak => format!("Investigate memory growth in {}", subject),
        FindingCategory::NetworkIn => format!("Review inbound traffic to {}", subject),
        FindingCategory::NetworkOut => format!("Review outbound traffic from {}", subject),
    }
}

/// Namespace flag for namespaced objects, empty for cluster-scoped ones
fn namespace_flag(entity: &EntityRef) -> String {
    if entity.namespace.is_empty() {
        String::new()
    } else {
        format!(" -n {}", entity.namespace)
    }
}

/// Read-only command that shows the evidence behind a finding
pub fn diagnostic_command(category: FindingCategory, entity: &EntityRef) -> String {
    let ns = namespace_flag(entity);
    let name = &entity.name;

    match (category, entity.kind) {
        (FindingCategory::HighCpu | FindingCategory::MemoryLeak, EntityKind::Pod) => {
            format!("kubectl top pod {}{} --containers", name, ns)
        }
        (FindingCategory::HighCpu | FindingCategory::MemoryLeak, EntityKind::Node) => {
            format!("kubectl top node {}", name)
        }
        (FindingCategory::FrequentRestarts, EntityKind::Pod) => {
            format!("kubectl logs {}{} --previous --tail=100", name, ns)
        }
        (FindingCategory::NetworkIn | FindingCategory::NetworkOut, EntityKind::Pod) => {
            format!("kubectl describe pod {}{}", name, ns)
        }
        (_, EntityKind::Node) => format!("kubectl describe node {}", name),
        (_, EntityKind::Deployment) => {
            format!("kubectl rollout history deployment/{}{}", name, ns)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DedupKey;
    use chrono::{TimeZone, Utc};

    fn finding(id: u64, entity: EntityRef, category: FindingCategory, severity: Severity) -> Finding {
        let seen = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        Finding {
            id,
            key: DedupKey {
                detector: "test".to_string(),
                entity: entity.clone(),
                category,
            },
            detector: "test".to_string(),
            category,
            entity,
            severity,
            message: "observed".to_string(),
            recommendation: "do something".to_string(),
            first_seen: seen,
            last_seen: seen,
            occurrences: 1,
        }
    }

    #[test]
    fn test_one_recommendation_per_finding() {
        let findings = vec![
            finding(1, EntityRef::pod("web", "api-7f9"), FindingCategory::HighCpu, Severity::Warning),
            finding(2, EntityRef::pod("web", "api-7f9"), FindingCategory::NetworkIn, Severity::Warning),
        ];
        let recs = recommend(&findings);
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.action == "do something"));
    }

    #[test]
    fn test_ordered_by_priority() {
        let findings = vec![
            finding(1, EntityRef::pod("web", "api-7f9"), FindingCategory::HighCpu, Severity::Warning),
            finding(2, EntityRef::pod("default", "worker-2"), FindingCategory::FrequentRestarts, Severity::Critical),
            finding(3, EntityRef::pod("data", "redis-master"), FindingCategory::MemoryLeak, Severity::Warning),
        ];
        let recs = recommend(&findings);

        let priorities: Vec<_> = recs.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![Priority::High, Priority::High, Priority::Medium]);
        assert_eq!(recs[2].finding_id, 1);
    }

    #[test]
    fn test_diagnostic_commands_are_read_only() {
        let pod = EntityRef::pod("default", "worker-2");
        assert_eq!(
            diagnostic_command(FindingCategory::FrequentRestarts, &pod),
            "kubectl logs worker-2 -n default --previous --tail=100"
        );

        let node = EntityRef::node("worker-node-1");
        assert_eq!(
            diagnostic_command(FindingCategory::HighCpu, &node),
            "kubectl top node worker-node-1"
        );

        let deploy = EntityRef::deployment("shop", "frontend");
        assert_eq!(
            diagnostic_command(FindingCategory::FrequentRestarts, &deploy),
            "kubectl rollout history deployment/frontend -n shop"
        );

        for category in [
            FindingCategory::HighCpu,
            FindingCategory::FrequentRestarts,
            FindingCategory::MemoryLeak,
            FindingCategory::NetworkIn,
            FindingCategory::NetworkOut,
        ] {
            for entity in [&pod, &node, &deploy] {
                let cmd = diagnostic_command(category, entity);
                assert!(cmd.starts_with("kubectl "));
                for verb in ["delete", "scale", "apply", "patch", "edit"] {
                    assert!(!cmd.contains(verb), "{} is not read-only", cmd);
                }
            }
        }
    }

    #[test]
    fn test_empty_findings() {
        assert!(recommend(&[]).is_empty());
    }
}
