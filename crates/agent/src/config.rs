//! Agent configuration
//!
//! Loaded once at startup from an optional file named by `INSIGHT_CONFIG`
//! and overlaid by `INSIGHT_*` environment variables, with `__` separating
//! nested keys (`INSIGHT_ENGINE__RULES__CPU__WARNING_RATIO=0.8`).

use anyhow::{Context, Result};
use insight_lib::config::EngineConfig;
use serde::Deserialize;
use std::path::Path;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "INSIGHT_CONFIG";

const ENV_PREFIX: &str = "INSIGHT";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Node name from the Kubernetes downward API
    pub node_name: String,

    /// Port for the dashboard API, health and metrics
    pub api_port: u16,

    pub engine: EngineConfig,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: 8080,
            engine: EngineConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment and the optional config file
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load configuration with an explicit file, still overlaid by the environment
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config: AgentConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config
            .engine
            .validate()
            .context("Engine configuration rejected")?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Loading reads the process environment, which the override test mutates
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let _env = env_guard();
        let config = AgentConfig::load_from(None).unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_partial_toml_file() {
        let _env = env_guard();
        let file = write_config(
            ".toml",
            r#"
node_name = "worker-node-1"
api_port = 9100

[engine]
grace_period_secs = 120

[engine.rules.cpu]
warning_ratio = 0.8
"#,
        );

        let config = AgentConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.node_name, "worker-node-1");
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.engine.grace_period_secs, 120);
        assert!((config.engine.rules.cpu.warning_ratio - 0.8).abs() < 1e-9);
        // Untouched fields keep their defaults
        assert_eq!(config.engine.rules.cpu.sample_count, 3);
        assert_eq!(config.engine.collection_interval_secs, 30);
    }

    #[test]
    fn test_json_file() {
        let _env = env_guard();
        let file = write_config(".json", r#"{ "engine": { "max_absent_cycles": 5 } }"#);
        let config = AgentConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.engine.max_absent_cycles, 5);
    }

    #[test]
    fn test_invalid_engine_config_rejected() {
        let _env = env_guard();
        let file = write_config(
            ".toml",
            r#"
[engine.rules.cpu]
warning_ratio = 0.97
critical_ratio = 0.95
"#,
        );

        let err = AgentConfig::load_from(Some(file.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("warning_ratio"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let _env = env_guard();
        let result = AgentConfig::load_from(Some(Path::new("/nonexistent/insight.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_environment_overrides_file_and_defaults() {
        let _env = env_guard();
        let file = write_config(
            ".toml",
            r#"
api_port = 9100

[engine]
grace_period_secs = 120
"#,
        );

        let vars = [
            ("INSIGHT_API_PORT", "9555"),
            ("INSIGHT_ENGINE__GRACE_PERIOD_SECS", "77"),
            ("INSIGHT_ENGINE__RULES__CPU__WARNING_RATIO", "0.8"),
        ];
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        let loaded = AgentConfig::load_from(Some(file.path()));
        for (key, _) in vars {
            std::env::remove_var(key);
        }

        let config = loaded.unwrap();
        assert_eq!(config.api_port, 9555);
        assert_eq!(config.engine.grace_period_secs, 77);
        assert!((config.engine.rules.cpu.warning_ratio - 0.8).abs() < 1e-9);
        assert_eq!(config.engine.collection_interval_secs, 30);
    }
}
