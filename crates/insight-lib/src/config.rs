//! Engine configuration
//!
//! Supplied once at startup; there is no hot reload. Every field has a
//! default so partial configuration files and environment overlays work.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the detection engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between collection cycles
    pub collection_interval_secs: u64,
    /// Per-entity timeout for a metrics fetch
    pub collection_timeout_ms: u64,
    /// Consecutive cycles without a snapshot before an entity is evicted
    pub max_absent_cycles: u32,
    /// Time a finding may go without a reaffirming candidate before it closes
    pub grace_period_secs: u64,
    pub window: WindowConfig,
    pub activity: ActivityConfig,
    pub rules: RulesConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collection_interval_secs: 30,
            collection_timeout_ms: 5_000,
            max_absent_cycles: 3,
            grace_period_secs: 300,
            window: WindowConfig::default(),
            activity: ActivityConfig::default(),
            rules: RulesConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval_secs)
    }

    pub fn collection_timeout(&self) -> Duration {
        Duration::from_millis(self.collection_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// How long an entity may go unrecorded before its history is dropped
    ///
    /// Saturates; `validate` rejects configurations where it would overflow.
    pub fn max_absence(&self) -> Duration {
        self.checked_max_absence().unwrap_or(Duration::MAX)
    }

    fn checked_max_absence(&self) -> Option<Duration> {
        self.collection_interval().checked_mul(self.max_absent_cycles)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_zero("collection_interval_secs", self.collection_interval_secs)?;
        non_zero("collection_timeout_ms", self.collection_timeout_ms)?;
        non_zero("max_absent_cycles", self.max_absent_cycles as u64)?;
        if self.checked_max_absence().is_none() {
            return Err(ConfigError::Overflow {
                field: "collection_interval_secs * max_absent_cycles",
            });
        }
        non_zero("window.max_samples", self.window.max_samples as u64)?;
        non_zero("activity.max_entries", self.activity.max_entries as u64)?;
        self.rules.validate()
    }
}

/// Capacity of each entity's history window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Maximum snapshots kept per entity
    pub max_samples: usize,
    /// Maximum age of a snapshot relative to the newest one (unbounded if unset)
    pub max_age_secs: Option<u64>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_samples: 120,
            max_age_secs: Some(60 * 60),
        }
    }
}

impl WindowConfig {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }
}

/// Retention of the activity log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub max_entries: usize,
    pub max_age_secs: Option<u64>,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            max_age_secs: Some(24 * 60 * 60),
        }
    }
}

impl ActivityConfig {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }
}

/// Thresholds for every registered evaluator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub cpu: CpuRuleConfig,
    pub restart: RestartRuleConfig,
    pub memory: MemoryRuleConfig,
    pub network: NetworkRuleConfig,
}

impl RulesConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        non_zero("rules.cpu.sample_count", self.cpu.sample_count as u64)?;
        ratio("rules.cpu.warning_ratio", self.cpu.warning_ratio)?;
        ratio("rules.cpu.critical_ratio", self.cpu.critical_ratio)?;
        ordered(
            ("rules.cpu.warning_ratio", self.cpu.warning_ratio),
            ("rules.cpu.critical_ratio", self.cpu.critical_ratio),
        )?;

        non_zero("rules.restart.span_secs", self.restart.span_secs)?;
        if self.restart.critical_multiplier < 1.0 {
            return Err(ConfigError::Inverted {
                lower_field: "rules.restart.critical_multiplier",
                lower: self.restart.critical_multiplier,
                upper_field: "1.0",
                upper: 1.0,
            });
        }

        non_zero("rules.memory.consecutive_rises", self.memory.consecutive_rises as u64)?;
        ratio("rules.memory.floor_ratio", self.memory.floor_ratio)?;

        non_zero("rules.network.min_samples", self.network.min_samples as u64)?;
        if self.network.z_threshold <= 0.0 {
            return Err(ConfigError::RatioOutOfRange {
                field: "rules.network.z_threshold",
                value: self.network.z_threshold,
            });
        }
        ordered(
            ("rules.network.z_threshold", self.network.z_threshold),
            ("rules.network.critical_z", self.network.critical_z),
        )
    }
}

/// CPU threshold rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuRuleConfig {
    /// Number of most recent snapshots averaged (K)
    pub sample_count: usize,
    pub warning_ratio: f64,
    pub critical_ratio: f64,
}

impl Default for CpuRuleConfig {
    fn default() -> Self {
        Self {
            sample_count: 3,
            warning_ratio: 0.85,
            critical_ratio: 0.95,
        }
    }
}

/// Restart-rate rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartRuleConfig {
    /// Restarts tolerated within the span; strictly more fires (R)
    pub max_restarts: u64,
    pub span_secs: u64,
    /// Delta above `max_restarts * critical_multiplier` is critical
    pub critical_multiplier: f64,
}

impl Default for RestartRuleConfig {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            span_secs: 10 * 60,
            critical_multiplier: 2.0,
        }
    }
}

impl RestartRuleConfig {
    pub fn span(&self) -> Duration {
        Duration::from_secs(self.span_secs)
    }
}

/// Memory-trend (suspected leak) rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryRuleConfig {
    /// Successive rises required (M); needs M + 1 snapshots
    pub consecutive_rises: usize,
    /// Current ratio must exceed this floor
    pub floor_ratio: f64,
}

impl Default for MemoryRuleConfig {
    fn default() -> Self {
        Self {
            consecutive_rises: 5,
            floor_ratio: 0.5,
        }
    }
}

/// Network z-score rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkRuleConfig {
    /// Trailing samples required before testing
    pub min_samples: usize,
    pub z_threshold: f64,
    pub critical_z: f64,
}

impl Default for NetworkRuleConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            z_threshold: 3.0,
            critical_z: 5.0,
        }
    }
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero { field })
    } else {
        Ok(())
    }
}

fn ratio(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::RatioOutOfRange { field, value })
    }
}

fn ordered(lower: (&'static str, f64), upper: (&'static str, f64)) -> Result<(), ConfigError> {
    if lower.1 < upper.1 {
        Ok(())
    } else {
        Err(ConfigError::Inverted {
            lower_field: lower.0,
            lower: lower.1,
            upper_field: upper.0,
            upper: upper.1,
        })
    }
}
