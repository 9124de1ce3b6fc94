//! Server configuration
//!
//! Loaded from an optional TOML file, then overridden by `SAFETY__*`
//! environment variables (for example `SAFETY__SERVER__BIND_ADDR`).

use crate::rate_limit::RateLimitConfig;
use alerting::{EscalationConfig, ThresholdProfile};
use config::{Config, ConfigError, Environment, File};
use notify::NotifierConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File read when no `--config` path is given
pub const DEFAULT_CONFIG_FILE: &str = "safety-monitor.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub notifier: NotifierConfig,
    /// System-wide thresholds used where a subject has no preference
    pub defaults: ThresholdProfile,
    pub escalation: EscalationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` wins when set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite URL; in-memory repository when absent
    pub database_url: Option<String>,
    /// Samples kept per subject by the in-memory repository
    pub retention_per_subject: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            retention_per_subject: 1000,
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (file, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        Config::builder()
            .add_source(File::from(file).required(required))
            .add_source(
                Environment::with_prefix("SAFETY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::NotifierKind;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert!(config.storage.database_url.is_none());
        assert_eq!(config.notifier.kind, NotifierKind::Log);
        assert_eq!(config.defaults.grace_period_secs, 600);
        assert_eq!(config.defaults.max_distance_apart, 250.0);
        assert_eq!(config.escalation.notify_timeout_secs, 10);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let path = write_temp(
            "safety-partial",
            r#"
[server]
bind_addr = "127.0.0.1:9000"

[defaults]
grace_period_secs = 30

[notifier]
kind = "mqtt"

[notifier.mqtt]
broker_host = "broker.local"
"#,
        );

        let config = AppConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.defaults.grace_period_secs, 30);
        assert_eq!(config.defaults.max_heart_rate, 150.0);
        assert_eq!(config.notifier.kind, NotifierKind::Mqtt);
        assert_eq!(config.notifier.mqtt.broker_host, "broker.local");
        assert_eq!(config.notifier.mqtt.broker_port, 1883);
        assert_eq!(config.rate_limit.burst_size, RateLimitConfig::default().burst_size);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir().join("safety-monitor-does-not-exist.toml");
        assert!(AppConfig::load(Some(&path)).is_err());
    }
}
