//! Network traffic anomaly detection
//!
//! Compares the current byte rate in each direction against the trailing
//! mean of the window and flags values more than a configured number of
//! standard deviations away, in either direction.

use super::{candidate, Evaluator, TrailingStats};
use crate::config::NetworkRuleConfig;
use crate::history::HistoryWindow;
use crate::models::{FindingCandidate, FindingCategory, Severity, Snapshot};

const DETECTOR: &str = "network_anomaly";

const RECOMMENDATION: &str =
    "Correlate with ingress logs and recent deployments; check for retry storms, scraping or data exfiltration";

/// Traffic direction under test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn rate(&self, snapshot: &Snapshot) -> f64 {
        match self {
            Direction::In => snapshot.network_rx_bytes_per_sec,
            Direction::Out => snapshot.network_tx_bytes_per_sec,
        }
    }

    fn category(&self) -> FindingCategory {
        match self {
            Direction::In => FindingCategory::NetworkIn,
            Direction::Out => FindingCategory::NetworkOut,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Direction::In => "inbound",
            Direction::Out => "outbound",
        }
    }
}

/// Z-score test on per-direction byte rates
pub struct NetworkAnomalyEvaluator {
    /// Trailing samples required before testing
    pub min_samples: usize,
    pub z_threshold: f64,
    pub critical_z: f64,
}

/// Deviation of the current rate from the trailing window
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficAnomaly {
    pub direction: Direction,
    pub current: f64,
    pub expected: f64,
    pub z_score: f64,
}

impl TrafficAnomaly {
    /// Percentage above (positive) or below (negative) the trailing mean
    pub fn percentage_from_expected(&self) -> f64 {
        if self.expected < f64::EPSILON {
            return 0.0;
        }
        ((self.current - self.expected) / self.expected) * 100.0
    }
}

impl NetworkAnomalyEvaluator {
    pub fn new(config: &NetworkRuleConfig) -> Self {
        Self {
            min_samples: config.min_samples.max(2),
            z_threshold: config.z_threshold,
            critical_z: config.critical_z,
        }
    }

    /// Test one direction; `None` for insufficient data, zero variance or
    /// an in-range value
    pub fn detect(&self, window: &HistoryWindow, direction: Direction) -> Option<TrafficAnomaly> {
        let rates: Vec<f64> = window.iter().map(|s| direction.rate(s)).collect();
        let (current, trailing) = rates.split_last()?;

        if trailing.len() < self.min_samples {
            return None;
        }

        let stats = TrailingStats::from_values(trailing)?;
        let z_score = stats.z_score(*current)?;

        if z_score > self.z_threshold {
            Some(TrafficAnomaly {
                direction,
                current: *current,
                expected: stats.mean,
                z_score,
            })
        } else {
            None
        }
    }

    fn severity(&self, anomaly: &TrafficAnomaly) -> Severity {
        if anomaly.z_score > self.critical_z {
            Severity::Critical
        } else {
            Severity::Warning
        }
    }
}

impl Default for NetworkAnomalyEvaluator {
    fn default() -> Self {
        Self::new(&NetworkRuleConfig::default())
    }
}

impl Evaluator for NetworkAnomalyEvaluator {
    fn name(&self) -> &'static str {
        DETECTOR
    }

    fn evaluate(&self, window: &HistoryWindow) -> Vec<FindingCandidate> {
        let Some(latest) = window.latest() else {
            return Vec::new();
        };

        [Direction::In, Direction::Out]
            .into_iter()
            .filter_map(|direction| self.detect(window, direction))
            .map(|anomaly| {
                let movement = if anomaly.current >= anomaly.expected {
                    "spiked"
                } else {
                    "dropped"
                };
                let message = format!(
                    "{} traffic {} to {:.0} B/s (expected {:.0} B/s, z-score {:.1}, {:+.0}%)",
                    anomaly.direction.label(),
                    movement,
                    anomaly.current,
                    anomaly.expected,
                    anomaly.z_score,
                    anomaly.percentage_from_expected()
                );
                candidate(
                    DETECTOR,
                    latest,
                    anomaly.direction.category(),
                    self.severity(&anomaly),
                    message,
                    RECOMMENDATION,
                )
            })
            .collect()
    }
}
