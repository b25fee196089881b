//! Kafka adapters built on rdkafka (librdkafka bindings).
//!
//! - [`KafkaTopicDirectory`] lists topics from cluster metadata and creates
//!   flow topics through the admin API
//! - [`KafkaTransport`] owns the shared monitoring consumer
//! - [`KafkaPublisher`] writes payloads to flow topics
//!
//! ## Example
//!
//! ```rust,no_run
//! use flowwatch_adapters::kafka::{KafkaTopicDirectory, KafkaTransport};
//! use flowwatch_adapters::KafkaSettings;
//! use flowwatch_monitor::FlowOutputMonitor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = KafkaSettings::builder()
//!         .brokers("localhost:9092")
//!         .group_id("flow-output-monitor-group")
//!         .build()?;
//!
//!     let monitor = FlowOutputMonitor::builder()
//!         .directory(KafkaTopicDirectory::new(&settings)?)
//!         .transport(KafkaTransport::new(&settings)?)
//!         .build()?;
//!
//!     let topics = monitor.start_monitoring().await?;
//!     println!("Monitoring {} flow topics", topics.len());
//!
//!     monitor.disconnect().await?;
//!     Ok(())
//! }
//! ```

mod directory;
mod publisher;
mod transport;

pub use directory::KafkaTopicDirectory;
pub use publisher::KafkaPublisher;
pub use transport::KafkaTransport;

use rdkafka::error::{KafkaError, RDKafkaErrorCode};

/// Whether librdkafka considers the client unusable after this error.
pub(crate) fn is_fatal(err: &KafkaError) -> bool {
    err.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_code_is_fatal() {
        assert!(is_fatal(&KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal)));
    }

    #[test]
    fn transport_failures_are_recoverable() {
        assert!(!is_fatal(&KafkaError::MessageConsumption(
            RDKafkaErrorCode::BrokerTransportFailure
        )));
        assert!(!is_fatal(&KafkaError::Canceled));
    }
}
