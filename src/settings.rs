//! Layered configuration: defaults, config file, environment, CLI flags.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use flowwatch_adapters::{split_brokers, KafkaSettings};
use flowwatch_monitor::{MonitorConfig, DEFAULT_CAPACITY};
use serde::Deserialize;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_NAME: &str = "flowwatch";

/// Everything the binary can be configured with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub kafka: KafkaSettings,
    pub monitor: MonitorSettings,
    pub logging: LoggingSettings,
}

/// The `[monitor]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Records kept in the output cache.
    pub capacity: usize,
    /// Seconds between status reports.
    pub report_interval_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            report_interval_secs: 30,
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Values given on the command line, applied over everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub brokers: Option<String>,
    pub client_id: Option<String>,
    pub group_id: Option<String>,
    pub capacity: Option<usize>,
    pub log_level: Option<String>,
}

impl Settings {
    /// Load settings from `path` (required) or `./flowwatch.{toml,yaml,json}`
    /// (optional), then `FLOWWATCH_*` environment variables.
    ///
    /// Nested keys use a double underscore: `FLOWWATCH_KAFKA__GROUP_ID`.
    /// `FLOWWATCH_KAFKA__BROKERS` accepts a comma-separated list.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("FLOWWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("kafka.brokers")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Apply command-line overrides.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(brokers) = &overrides.brokers {
            self.kafka.brokers = split_brokers(brokers);
        }
        if let Some(client_id) = &overrides.client_id {
            self.kafka.client_id = client_id.clone();
        }
        if let Some(group_id) = &overrides.group_id {
            self.kafka.group_id = group_id.clone();
        }
        if let Some(capacity) = overrides.capacity {
            self.monitor.capacity = capacity;
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Monitor configuration derived from these settings.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            capacity: self.monitor.capacity,
            event_buffer: self.kafka.buffer,
        }
    }

    /// Interval between status reports.
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.report_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_file() {
        let settings = Settings::default();
        assert_eq!(settings.monitor.capacity, 500);
        assert_eq!(settings.kafka.group_id, "flow-output-monitor-group");
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.report_interval(), Duration::from_secs(30));
    }

    #[test]
    fn loads_toml_file() {
        let file = write_config(
            r#"
            [kafka]
            brokers = ["k1:9092", "k2:9092"]
            group_id = "ops-monitor"

            [monitor]
            capacity = 50
            "#,
            ".toml",
        );

        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.kafka.brokers, vec!["k1:9092", "k2:9092"]);
        assert_eq!(settings.kafka.group_id, "ops-monitor");
        assert_eq!(settings.kafka.client_id, "flow-output-monitor");
        assert_eq!(settings.monitor.capacity, 50);
        assert_eq!(settings.monitor.report_interval_secs, 30);
    }

    #[test]
    fn loads_json_file() {
        let file = write_config(r#"{"logging": {"level": "debug"}}"#, ".json");
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }

    #[test]
    fn overrides_win() {
        let mut settings = Settings::default();
        settings.apply(&Overrides {
            brokers: Some("a:9092,b:9092".into()),
            group_id: Some("cli-group".into()),
            capacity: Some(10),
            ..Overrides::default()
        });

        assert_eq!(settings.kafka.brokers, vec!["a:9092", "b:9092"]);
        assert_eq!(settings.kafka.group_id, "cli-group");
        assert_eq!(settings.kafka.client_id, "flow-output-monitor");
        assert_eq!(settings.monitor_config().capacity, 10);
    }
}
