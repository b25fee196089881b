//! Error types for adapters.

use flowwatch_monitor::MonitorError;
use thiserror::Error;

/// Errors that can occur when talking to a broker.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Settings were rejected before any client was created.
    #[error("Invalid settings: {0}")]
    Config(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The broker returned an error.
    #[error("Broker error: {0}")]
    Broker(String),

    /// Timeout waiting for the broker.
    #[error("Request timed out")]
    Timeout,
}

impl From<AdapterError> for MonitorError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Config(message) => MonitorError::InvalidConfig(message),
            other => MonitorError::transport(other.to_string()),
        }
    }
}

#[cfg(feature = "kafka")]
impl From<rdkafka::error::KafkaError> for AdapterError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        use rdkafka::error::{KafkaError, RDKafkaErrorCode};

        match err {
            KafkaError::ClientConfig(..) | KafkaError::ClientCreation(_) => {
                AdapterError::Config(err.to_string())
            }
            _ if err.rdkafka_error_code() == Some(RDKafkaErrorCode::OperationTimedOut) => {
                AdapterError::Timeout
            }
            KafkaError::MetadataFetch(_) => AdapterError::Connection(err.to_string()),
            _ => AdapterError::Broker(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_to_invalid_config() {
        let err: MonitorError = AdapterError::Config("no brokers".into()).into();
        assert_eq!(err, MonitorError::InvalidConfig("no brokers".into()));
    }

    #[test]
    fn broker_errors_map_to_transport() {
        let err: MonitorError = AdapterError::Timeout.into();
        assert!(matches!(err, MonitorError::Transport { fatal: false, .. }));
    }

    #[cfg(feature = "kafka")]
    #[test]
    fn kafka_metadata_errors_are_connection_errors() {
        use rdkafka::error::{KafkaError, RDKafkaErrorCode};

        let err = AdapterError::from(KafkaError::MetadataFetch(
            RDKafkaErrorCode::BrokerTransportFailure,
        ));
        assert!(matches!(err, AdapterError::Connection(_)));

        let err =
            AdapterError::from(KafkaError::MetadataFetch(RDKafkaErrorCode::OperationTimedOut));
        assert!(matches!(err, AdapterError::Timeout));
    }
}
