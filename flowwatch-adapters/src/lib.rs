//! # flowwatch-adapters
//!
//! Broker adapters for the flowwatch flow output monitor.
//!
//! The monitor depends only on the `TopicDirectory`, `Transport` and
//! `Publisher` traits from `flowwatch-monitor`. This crate implements them
//! for real brokers.
//!
//! ## Supported Systems
//!
//! - **Kafka** (`kafka` feature) - topic discovery from cluster metadata, a
//!   shared consumer-group subscription, a producer and flow topic creation
//!
//! Connection settings ([`KafkaSettings`]) are always available so that
//! configuration can be parsed without linking librdkafka.

pub mod error;
mod settings;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use error::AdapterError;
pub use settings::{
    split_brokers, KafkaSettings, KafkaSettingsBuilder, DEFAULT_BROKERS, DEFAULT_CLIENT_ID,
    DEFAULT_GROUP_ID,
};
