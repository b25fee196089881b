//! Broker abstraction consumed by the monitor.
//!
//! The monitor never talks to a broker client directly. It needs three
//! collaborators, each behind a trait:
//!
//! - [`TopicDirectory`] lists topics so the flow-topic set can be resolved
//! - [`Transport`] owns the shared consumer and streams records
//! - [`Publisher`] writes to a flow's topic (glue and test harnesses only)
//!
//! [`MemoryBroker`] implements all three in-process.

mod memory;

pub use memory::MemoryBroker;

use std::collections::BTreeSet;

use async_trait::async_trait;
use flowwatch_types::FlowId;
use tokio::sync::mpsc;

use crate::MonitorError;

/// Default buffer size for transport event channels.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// A message as delivered by the transport, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    /// Broker timestamp in milliseconds, if known.
    pub timestamp_ms: Option<i64>,
}

impl RawRecord {
    /// Create a record on partition 0 with no key or timestamp.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            key: None,
            payload: payload.into(),
            timestamp_ms: None,
        }
    }
}

/// Pushed by a transport while a subscription is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A message was received.
    Record(RawRecord),
    /// The consumer connected (or reconnected).
    Connected,
    /// The consumer hit an error. `fatal` means the connection is gone for good.
    Error { message: String, fatal: bool },
}

/// Stream of events for one subscription.
///
/// The transport closes it (drops the sender) when the subscription ends.
pub type TransportEvents = mpsc::Receiver<TransportEvent>;

/// Lists the topics known to the broker.
#[async_trait]
pub trait TopicDirectory: Send + Sync {
    /// All topic names, in broker order.
    ///
    /// Fails with [`MonitorError::DirectoryUnavailable`] on transport errors.
    async fn list_topics(&self) -> Result<Vec<String>, MonitorError>;
}

/// The single shared consumer used for monitoring.
///
/// Only one subscription is live at a time; calling `subscribe` replaces the
/// topic set. Nothing streamed after a fatal [`TransportEvent::Error`] is
/// ingested, and the subscription is released.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribe to exactly `topics` and start streaming events.
    async fn subscribe(&self, topics: &BTreeSet<String>) -> Result<TransportEvents, MonitorError>;

    /// End the current subscription and close its event stream.
    ///
    /// Events already buffered in the stream stay readable. Must be a no-op
    /// when nothing is subscribed.
    async fn unsubscribe(&self) -> Result<(), MonitorError>;

    /// Release the underlying connection.
    async fn close(&self) -> Result<(), MonitorError>;
}

/// Delivers payloads to flow topics.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Send `payload` to the topic of `flow_id`. Returns `true` on success.
    async fn send(&self, flow_id: &FlowId, payload: &[u8], key: Option<&str>) -> bool;
}
