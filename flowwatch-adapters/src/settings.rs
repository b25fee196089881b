//! Broker connection settings.

use std::time::Duration;

use serde::Deserialize;

use crate::AdapterError;

/// Default broker address.
pub const DEFAULT_BROKERS: &str = "localhost:9092";
/// Default client id.
pub const DEFAULT_CLIENT_ID: &str = "flow-output-monitor";
/// Default consumer group id.
pub const DEFAULT_GROUP_ID: &str = "flow-output-monitor-group";

/// Connection settings for a Kafka cluster.
///
/// Deserializable so it can sit in a config file section:
///
/// ```toml
/// [kafka]
/// brokers = ["kafka-1:9092", "kafka-2:9092"]
/// group_id = "flowwatch"
/// auto_offset_reset = "earliest"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KafkaSettings {
    /// Bootstrap broker addresses.
    pub brokers: Vec<String>,
    pub client_id: String,
    pub group_id: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Where a new consumer group starts reading: `latest` or `earliest`.
    pub auto_offset_reset: String,
    /// Events buffered between the consumer and the monitor.
    pub buffer: usize,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKERS.to_string()],
            client_id: DEFAULT_CLIENT_ID.to_string(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            timeout_ms: 10_000,
            auto_offset_reset: "latest".to_string(),
            buffer: 1024,
        }
    }
}

impl KafkaSettings {
    /// Create a builder starting from the defaults.
    pub fn builder() -> KafkaSettingsBuilder {
        KafkaSettingsBuilder::default()
    }

    /// Brokers joined for `bootstrap.servers`.
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject settings no client could work with.
    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(AdapterError::Config("at least one broker is required".into()));
        }
        if self.group_id.trim().is_empty() {
            return Err(AdapterError::Config("group id must not be empty".into()));
        }
        if !matches!(self.auto_offset_reset.as_str(), "latest" | "earliest") {
            return Err(AdapterError::Config(format!(
                "auto_offset_reset must be 'latest' or 'earliest', got '{}'",
                self.auto_offset_reset
            )));
        }
        if self.buffer == 0 {
            return Err(AdapterError::Config("buffer must be greater than zero".into()));
        }
        Ok(())
    }

    /// Client configuration for the monitoring consumer.
    #[cfg(feature = "kafka")]
    pub fn consumer_config(&self) -> rdkafka::ClientConfig {
        let mut config = self.common_config();
        config
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .set("enable.partition.eof", "false");
        config
    }

    /// Client configuration for producers and admin clients.
    #[cfg(feature = "kafka")]
    pub fn client_config(&self) -> rdkafka::ClientConfig {
        self.common_config()
    }

    #[cfg(feature = "kafka")]
    fn common_config(&self) -> rdkafka::ClientConfig {
        let mut config = rdkafka::ClientConfig::new();
        config
            .set("bootstrap.servers", self.bootstrap_servers())
            .set("client.id", &self.client_id)
            .set("socket.timeout.ms", self.timeout_ms.to_string());
        config
    }
}

/// Builder for [`KafkaSettings`].
#[derive(Debug, Default)]
pub struct KafkaSettingsBuilder {
    brokers: Option<String>,
    client_id: Option<String>,
    group_id: Option<String>,
    timeout: Option<Duration>,
    auto_offset_reset: Option<String>,
    buffer: Option<usize>,
}

impl KafkaSettingsBuilder {
    /// Set the Kafka broker addresses (comma-separated).
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the client id reported to the brokers.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the consumer group id.
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Read from the start of each partition instead of only new messages.
    pub fn from_beginning(mut self, from_beginning: bool) -> Self {
        let reset = if from_beginning { "earliest" } else { "latest" };
        self.auto_offset_reset = Some(reset.to_string());
        self
    }

    /// Set the consumer event buffer size.
    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Build and validate the settings.
    pub fn build(self) -> Result<KafkaSettings, AdapterError> {
        let defaults = KafkaSettings::default();
        let settings = KafkaSettings {
            brokers: match self.brokers {
                Some(brokers) => split_brokers(&brokers),
                None => defaults.brokers,
            },
            client_id: self.client_id.unwrap_or(defaults.client_id),
            group_id: self.group_id.unwrap_or(defaults.group_id),
            timeout_ms: self
                .timeout
                .map(|t| t.as_millis() as u64)
                .unwrap_or(defaults.timeout_ms),
            auto_offset_reset: self.auto_offset_reset.unwrap_or(defaults.auto_offset_reset),
            buffer: self.buffer.unwrap_or(defaults.buffer),
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Split a comma-separated broker list, dropping blanks.
pub fn split_brokers(brokers: &str) -> Vec<String> {
    brokers
        .split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = KafkaSettings::default();
        assert_eq!(settings.bootstrap_servers(), "localhost:9092");
        assert_eq!(settings.client_id, "flow-output-monitor");
        assert_eq!(settings.group_id, "flow-output-monitor-group");
        assert_eq!(settings.timeout(), Duration::from_secs(10));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn builder_splits_brokers() {
        let settings = KafkaSettings::builder()
            .brokers("broker1:9092, broker2:9092,")
            .build()
            .unwrap();
        assert_eq!(settings.brokers, vec!["broker1:9092", "broker2:9092"]);
        assert_eq!(settings.bootstrap_servers(), "broker1:9092,broker2:9092");
    }

    #[test]
    fn builder_chains_all_options() {
        let settings = KafkaSettings::builder()
            .brokers("localhost:9092")
            .client_id("probe")
            .group_id("probe-group")
            .timeout(Duration::from_secs(3))
            .from_beginning(true)
            .buffer(64)
            .build()
            .unwrap();

        assert_eq!(settings.client_id, "probe");
        assert_eq!(settings.group_id, "probe-group");
        assert_eq!(settings.timeout_ms, 3000);
        assert_eq!(settings.auto_offset_reset, "earliest");
        assert_eq!(settings.buffer, 64);
    }

    #[test]
    fn builder_rejects_empty_brokers() {
        let result = KafkaSettings::builder().brokers(" , ").build();
        assert!(matches!(result, Err(AdapterError::Config(_))));
    }

    #[test]
    fn validate_rejects_unknown_offset_reset() {
        let settings = KafkaSettings {
            auto_offset_reset: "smallest-ish".into(),
            ..KafkaSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn deserializes_partial_section() {
        let settings: KafkaSettings =
            serde_json::from_str(r#"{"brokers": ["k1:9092"], "group_id": "ops"}"#).unwrap();
        assert_eq!(settings.brokers, vec!["k1:9092"]);
        assert_eq!(settings.group_id, "ops");
        assert_eq!(settings.client_id, DEFAULT_CLIENT_ID);
    }

    #[cfg(feature = "kafka")]
    #[test]
    fn consumer_config_carries_group_and_reset() {
        let settings = KafkaSettings::default();
        let config = settings.consumer_config();
        assert_eq!(config.get("group.id"), Some("flow-output-monitor-group"));
        assert_eq!(config.get("auto.offset.reset"), Some("latest"));
        assert_eq!(config.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(settings.client_config().get("group.id"), None);
    }
}
