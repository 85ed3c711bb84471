//! Restart-rate detection
//!
//! Compares the cumulative restart counter at both ends of a sliding time
//! span instead of summing single-step deltas, so jitter between scrapes
//! cannot inflate the rate.

use super::{candidate, Evaluator};
use crate::config::RestartRuleConfig;
use crate::history::HistoryWindow;
use crate::models::{EntityStatus, FindingCandidate, FindingCategory, Severity, Snapshot};
use std::time::Duration;

const DETECTOR: &str = "restart_rate";

const RECOMMENDATION: &str =
    "Inspect logs of the previous container instance and recent events; check liveness probes and memory limits";

/// Fires when restarts within the span exceed the tolerated count
pub struct RestartRateEvaluator {
    /// Restarts tolerated within the span; strictly more fires
    pub max_restarts: u64,
    pub span: Duration,
    pub critical_multiplier: f64,
}

/// Restart delta measured over the span
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestartDelta {
    pub restarts: u64,
    pub elapsed: Duration,
}

impl RestartDelta {
    pub fn per_minute(&self) -> f64 {
        let minutes = self.elapsed.as_secs_f64() / 60.0;
        if minutes < f64::EPSILON {
            return self.restarts as f64;
        }
        self.restarts as f64 / minutes
    }
}

impl RestartRateEvaluator {
    pub fn new(config: &RestartRuleConfig) -> Self {
        Self {
            max_restarts: config.max_restarts,
            span: config.span(),
            critical_multiplier: config.critical_multiplier,
        }
    }

    /// Delta between the oldest and newest snapshot inside the span
    ///
    /// When the counter went backwards (the workload was recreated) the
    /// delta starts at the first snapshot after the last drop. `None` when
    /// fewer than two snapshots remain to compare.
    pub fn delta(&self, window: &HistoryWindow) -> Option<RestartDelta> {
        let in_span: Vec<&Snapshot> = window.within(self.span).collect();
        let since_reset = in_span
            .windows(2)
            .rposition(|pair| pair[1].restart_count < pair[0].restart_count)
            .map_or(0, |i| i + 1);

        let (oldest, newest) = match &in_span[since_reset..] {
            [oldest, .., newest] => (*oldest, *newest),
            _ => return None,
        };

        let elapsed = newest
            .timestamp
            .signed_duration_since(oldest.timestamp)
            .to_std()
            .unwrap_or_default();

        Some(RestartDelta {
            restarts: newest.restart_count.saturating_sub(oldest.restart_count),
            elapsed,
        })
    }

    fn classify(&self, delta: &RestartDelta, latest: &Snapshot) -> Option<Severity> {
        if delta.restarts <= self.max_restarts {
            return None;
        }

        let critical_line = self.max_restarts as f64 * self.critical_multiplier;
        if delta.restarts as f64 > critical_line || latest.status == EntityStatus::CrashLooping {
            Some(Severity::Critical)
        } else {
            Some(Severity::Warning)
        }
    }
}

impl Default for RestartRateEvaluator {
    fn default() -> Self {
        Self::new(&RestartRuleConfig::default())
    }
}

impl Evaluator for RestartRateEvaluator {
    fn name(&self) -> &'static str {
        DETECTOR
    }

    fn evaluate(&self, window: &HistoryWindow) -> Vec<FindingCandidate> {
        let (Some(delta), Some(latest)) = (self.delta(window), window.latest()) else {
            return Vec::new();
        };

        let Some(severity) = self.classify(&delta, latest) else {
            return Vec::new();
        };

        let mut message = format!(
            "{} restarts in the last {}s ({:.2}/min, tolerated {} per {}s)",
            delta.restarts,
            delta.elapsed.as_secs(),
            delta.per_minute(),
            self.max_restarts,
            self.span.as_secs()
        );
        if latest.status == EntityStatus::CrashLooping {
            message.push_str("; workload is crash-looping");
        }

        vec![candidate(
            DETECTOR,
            latest,
            FindingCategory::FrequentRestarts,
            severity,
            message,
            RECOMMENDATION,
        )]
    }
}
