//! # flowwatch-monitor
//!
//! Live, self-updating monitor over the output topics of a multi-tenant
//! stream-processing deployment.
//!
//! Every flow writes to its own topic named `<org>-<user>-<node>-topic`. The
//! monitor discovers those topics through a [`TopicDirectory`], keeps one
//! shared [`Transport`] subscription to all of them, and turns each incoming
//! message into an [`OutputRecord`] that is cached and announced to listeners.
//!
//! ## Quick Start
//!
//! ```rust
//! use flowwatch_monitor::{FlowOutputMonitor, MemoryBroker, Publisher};
//! use flowwatch_types::FlowId;
//!
//! # tokio_test::block_on(async {
//! let broker = MemoryBroker::new();
//! broker.create_topic("acme-alice-ingest-topic");
//!
//! let monitor = FlowOutputMonitor::builder()
//!     .directory(broker.clone())
//!     .transport(broker.clone())
//!     .build()
//!     .unwrap();
//!
//! let mut events = monitor.event_channel(16).unwrap();
//! monitor.start_monitoring().await.unwrap();
//!
//! let flow = FlowId::parse("acme-alice-ingest").unwrap();
//! broker.send(&flow, br#"{"ok":true}"#, None).await;
//!
//! // Lifecycle events arrive first
//! while let Some(event) = events.recv().await {
//!     if let Some(record) = event.as_output() {
//!         assert_eq!(record.flow_id, flow);
//!         break;
//!     }
//! }
//!
//! monitor.disconnect().await.unwrap();
//! # });
//! ```
//!
//! ## Features
//!
//! - **Self-updating**: `refresh()` picks up flow topics created after start
//! - **Bounded history**: the most recent records, with per-topic statistics
//! - **Typed events**: generic and per-flow listeners, isolated from each other
//! - **Pluggable brokers**: Kafka lives in `flowwatch-adapters`; an in-memory
//!   broker ships here for tests and demos

mod cache;
mod controller;
mod dispatcher;
mod error;
mod event;
mod monitor;
pub mod transport;

pub use cache::{OutputCache, DEFAULT_CAPACITY};
pub use controller::{RecordSink, ResolvedTopics, SubscriptionController};
pub use dispatcher::{EventDispatcher, ListenerId, ListenerResult};
pub use error::MonitorError;
pub use event::{EventKind, MonitorEvent};
pub use monitor::{FlowOutputMonitor, FlowOutputMonitorBuilder, MonitorConfig};
pub use transport::{
    MemoryBroker, Publisher, RawRecord, TopicDirectory, Transport, TransportEvent,
    TransportEvents,
};

// Re-export types for convenience
pub use flowwatch_types::{
    match_topic, FlowId, MonitorState, MonitoringStatus, OutputRecord, Payload, TopicStatistics,
};
