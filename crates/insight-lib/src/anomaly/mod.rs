//! Anomaly detection over per-entity history windows
//!
//! This module provides:
//! - Rule evaluators (CPU threshold, restart rate, memory trend, network z-score)
//! - Finding aggregation with deduplication, escalation and retirement
//! - The activity log of finding lifecycle events and engine faults
//!
//! Evaluators are independent and side-effect free: each one reads a single
//! window and returns zero or more candidates. Adding a detector means adding
//! one [`Evaluator`] implementation and registering it in
//! [`default_evaluators`]; the scheduler never branches on detector type.

mod activity;
mod aggregator;
mod cpu_threshold;
mod leak_detector;
mod network_anomaly;
mod restart_rate;
mod stats;

pub use activity::{ActivityAction, ActivityEntry, ActivityLog};
pub use aggregator::{AggregatorHandle, FindingAggregator, FindingQuery};
pub use cpu_threshold::CpuThresholdEvaluator;
pub use leak_detector::MemoryTrendEvaluator;
pub use network_anomaly::NetworkAnomalyEvaluator;
pub use restart_rate::RestartRateEvaluator;
pub use stats::{linear_regression_slope, TrailingStats};

use crate::config::RulesConfig;
use crate::history::HistoryWindow;
use crate::models::{FindingCandidate, FindingCategory, Severity, Snapshot};

/// Tolerance when comparing averaged ratios against watermarks
pub(crate) const RATIO_EPSILON: f64 = 1e-9;

/// A detector over one entity's history window
pub trait Evaluator: Send + Sync {
    /// Stable detector name, part of every dedup key this evaluator produces
    fn name(&self) -> &'static str;

    /// Inspect a window and return candidates
    ///
    /// Returning no candidates covers both "healthy" and "not enough data".
    fn evaluate(&self, window: &HistoryWindow) -> Vec<FindingCandidate>;
}

/// The static evaluator registry
pub fn default_evaluators(rules: &RulesConfig) -> Vec<Box<dyn Evaluator>> {
    vec![
        Box::new(CpuThresholdEvaluator::new(&rules.cpu)),
        Box::new(RestartRateEvaluator::new(&rules.restart)),
        Box::new(MemoryTrendEvaluator::new(&rules.memory)),
        Box::new(NetworkAnomalyEvaluator::new(&rules.network)),
    ]
}

/// Build a candidate anchored at the triggering snapshot
pub(crate) fn candidate(
    detector: &str,
    latest: &Snapshot,
    category: FindingCategory,
    severity: Severity,
    message: String,
    recommendation: &str,
) -> FindingCandidate {
    FindingCandidate {
        detector: detector.to_string(),
        category,
        entity: latest.entity.clone(),
        severity,
        message,
        recommendation: recommendation.to_string(),
        observed_at: latest.timestamp,
    }
}

/// Format a ratio as a percentage
pub(crate) fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names_are_unique() {
        let evaluators = default_evaluators(&RulesConfig::default());
        let mut names: Vec<_> = evaluators.iter().map(|e| e.name()).collect();
        assert_eq!(names.len(), 4);
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 4);
    }
}
