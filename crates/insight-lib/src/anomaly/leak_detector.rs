//! Memory leak detection
//!
//! Flags a suspected leak when the memory ratio rose in every one of the
//! last M snapshots with no compensating drop, and the current ratio sits
//! above a floor so normal cache warm-up from near zero is ignored.

use super::{candidate, linear_regression_slope, percent, Evaluator};
use crate::config::MemoryRuleConfig;
use crate::history::HistoryWindow;
use crate::models::{FindingCandidate, FindingCategory, Severity, Snapshot};
use chrono::{DateTime, Utc};

const DETECTOR: &str = "memory_trend";

const RECOMMENDATION: &str =
    "Capture a heap profile and compare allocations over time; raise the memory limit only as a stop-gap";

/// Detects monotonically increasing memory usage
pub struct MemoryTrendEvaluator {
    /// Successive rises required (M)
    pub consecutive_rises: usize,
    /// Current ratio must exceed this floor
    pub floor_ratio: f64,
}

/// Memory growth details
#[derive(Debug, Clone, PartialEq)]
pub struct LeakTrend {
    /// Growth in ratio units per second (least squares over the run)
    pub slope_per_sec: f64,
    pub current_ratio: f64,
    /// When the ratio is projected to reach 1.0
    pub projected_exhaustion: Option<DateTime<Utc>>,
}

impl LeakTrend {
    /// Growth rate in percentage points per minute
    pub fn percent_per_minute(&self) -> f64 {
        self.slope_per_sec * 60.0 * 100.0
    }
}

impl MemoryTrendEvaluator {
    pub fn new(config: &MemoryRuleConfig) -> Self {
        Self {
            consecutive_rises: config.consecutive_rises.max(1),
            floor_ratio: config.floor_ratio,
        }
    }

    /// Detect a strictly rising run over the last M + 1 snapshots
    pub fn detect(&self, window: &HistoryWindow) -> Option<LeakTrend> {
        let needed = self.consecutive_rises + 1;
        if window.len() < needed {
            return None;
        }

        let run: Vec<&Snapshot> = window.recent(needed).collect();

        let strictly_rising = run
            .windows(2)
            .all(|pair| pair[1].memory_ratio > pair[0].memory_ratio);
        if !strictly_rising {
            return None;
        }

        let latest = run.last()?;
        if latest.memory_ratio <= self.floor_ratio {
            return None;
        }

        let points: Vec<(f64, f64)> = run
            .iter()
            .map(|s| (s.timestamp.timestamp_millis() as f64 / 1000.0, s.memory_ratio))
            .collect();
        let slope = linear_regression_slope(&points);

        Some(LeakTrend {
            slope_per_sec: slope,
            current_ratio: latest.memory_ratio,
            projected_exhaustion: project_exhaustion(latest, slope),
        })
    }
}

/// Project when the ratio reaches 1.0 at the current slope
fn project_exhaustion(latest: &Snapshot, slope_per_sec: f64) -> Option<DateTime<Utc>> {
    if latest.memory_ratio >= 1.0 {
        return Some(latest.timestamp);
    }
    if slope_per_sec <= 0.0 {
        return None;
    }

    let seconds = (1.0 - latest.memory_ratio) / slope_per_sec;
    let millis = (seconds * 1000.0).min(i64::MAX as f64 / 2.0) as i64;
    latest
        .timestamp
        .checked_add_signed(chrono::Duration::milliseconds(millis))
}

impl Default for MemoryTrendEvaluator {
    fn default() -> Self {
        Self::new(&MemoryRuleConfig::default())
    }
}

impl Evaluator for MemoryTrendEvaluator {
    fn name(&self) -> &'static str {
        DETECTOR
    }

    fn evaluate(&self, window: &HistoryWindow) -> Vec<FindingCandidate> {
        let (Some(trend), Some(latest)) = (self.detect(window), window.latest()) else {
            return Vec::new();
        };

        let mut message = format!(
            "Memory rose in each of the last {} samples to {} (+{:.2} points/min)",
            self.consecutive_rises,
            percent(trend.current_ratio),
            trend.percent_per_minute()
        );
        if let Some(at) = trend.projected_exhaustion {
            message.push_str(&format!(
                "; projected to reach the limit at {}",
                at.format("%Y-%m-%dT%H:%M:%SZ")
            ));
        }

        vec![candidate(
            DETECTOR,
            latest,
            FindingCategory::MemoryLeak,
            Severity::Warning,
            message,
            RECOMMENDATION,
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowConfig;
    use crate::history::test_support::{at, snapshot};
    use crate::history::HistoryStore;
    use crate::models::EntityRef;

    fn cache() -> EntityRef {
        EntityRef::pod("data", "redis-master")
    }

    fn history(ratios: &[f64]) -> HistoryStore {
        let mut history = HistoryStore::new(WindowConfig::default());
        for (i, ratio) in ratios.iter().enumerate() {
            let mut s = snapshot(&cache(), i as i64 * 60);
            s.memory_ratio = *ratio;
            history.record(s).unwrap();
        }
        history
    }

    fn evaluate(ratios: &[f64]) -> Vec<FindingCandidate> {
        let history = history(ratios);
        MemoryTrendEvaluator::default().evaluate(history.window(&cache()).unwrap())
    }

    #[test]
    fn test_detect_steady_leak() {
        let findings = evaluate(&[0.55, 0.58, 0.61, 0.64, 0.67, 0.70]);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].category, FindingCategory::MemoryLeak);
        assert!(findings[0].message.contains("70.0%"));
    }

    #[test]
    fn test_flat_memory_is_not_a_leak() {
        assert!(evaluate(&[0.7; 8]).is_empty());
    }

    #[test]
    fn test_compensating_drop_rejected() {
        assert!(evaluate(&[0.55, 0.58, 0.61, 0.60, 0.67, 0.70]).is_empty());
        // A plateau inside the run also breaks it
        assert!(evaluate(&[0.55, 0.58, 0.61, 0.61, 0.67, 0.70]).is_empty());
    }

    #[test]
    fn test_growth_below_floor_ignored() {
        // Cache warm-up from a near-zero baseline
        assert!(evaluate(&[0.05, 0.10, 0.15, 0.20, 0.25, 0.30]).is_empty());
    }

    #[test]
    fn test_insufficient_samples() {
        assert!(evaluate(&[0.6, 0.7, 0.8, 0.9, 0.95]).is_empty());
    }

    #[test]
    fn test_only_trailing_run_matters() {
        // Old drop outside the last M + 1 samples
        let findings = evaluate(&[0.9, 0.5, 0.55, 0.6, 0.65, 0.7, 0.75]);
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_exhaustion_projection() {
        let history = history(&[0.5, 0.6, 0.7, 0.8, 0.9, 0.95]);
        let trend = MemoryTrendEvaluator::default()
            .detect(history.window(&cache()).unwrap())
            .unwrap();

        assert!(trend.slope_per_sec > 0.0);
        let projected = trend.projected_exhaustion.unwrap();
        assert!(projected > at(300));
        assert!(projected < at(900));
    }
}
