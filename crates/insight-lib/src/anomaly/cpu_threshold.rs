//! CPU threshold detection
//!
//! Averages the CPU ratio over the most recent K snapshots and compares it
//! against a warning and a critical watermark.

use super::{candidate, percent, Evaluator, RATIO_EPSILON};
use crate::config::CpuRuleConfig;
use crate::history::HistoryWindow;
use crate::models::{FindingCandidate, FindingCategory, Severity};

const DETECTOR: &str = "cpu_threshold";

const RECOMMENDATION: &str =
    "Raise the CPU limit or scale out replicas; profile the workload for hot loops or runaway threads";

/// Fires when sustained CPU usage exceeds configured watermarks
pub struct CpuThresholdEvaluator {
    /// Number of most recent snapshots averaged (K)
    pub sample_count: usize,
    pub warning_ratio: f64,
    pub critical_ratio: f64,
}

impl CpuThresholdEvaluator {
    pub fn new(config: &CpuRuleConfig) -> Self {
        Self {
            sample_count: config.sample_count.max(1),
            warning_ratio: config.warning_ratio,
            critical_ratio: config.critical_ratio,
        }
    }

    /// Mean CPU ratio over the last K snapshots, if enough are present
    pub fn trailing_mean(&self, window: &HistoryWindow) -> Option<f64> {
        if window.len() < self.sample_count {
            return None;
        }

        let sum: f64 = window.recent(self.sample_count).map(|s| s.cpu_ratio).sum();
        Some(sum / self.sample_count as f64)
    }

    fn classify(&self, mean: f64) -> Option<Severity> {
        if mean - self.critical_ratio > RATIO_EPSILON {
            Some(Severity::Critical)
        } else if mean - self.warning_ratio > RATIO_EPSILON {
            Some(Severity::Warning)
        } else {
            None
        }
    }
}

impl Default for CpuThresholdEvaluator {
    fn default() -> Self {
        Self::new(&CpuRuleConfig::default())
    }
}

impl Evaluator for CpuThresholdEvaluator {
    fn name(&self) -> &'static str {
        DETECTOR
    }

    fn evaluate(&self, window: &HistoryWindow) -> Vec<FindingCandidate> {
        let (Some(mean), Some(latest)) = (self.trailing_mean(window), window.latest()) else {
            return Vec::new();
        };

        let Some(severity) = self.classify(mean) else {
            return Vec::new();
        };

        let watermark = match severity {
            Severity::Critical => self.critical_ratio,
            _ => self.warning_ratio,
        };

        let message = format!(
            "CPU usage averaged {} over the last {} samples ({} above {})",
            percent(mean),
            self.sample_count,
            severity,
            percent(watermark)
        );

        vec![candidate(
            DETECTOR,
            latest,
            FindingCategory::HighCpu,
            severity,
            message,
            RECOMMENDATION,
        )]
    }
}
