//! # flowwatch-types
//!
//! Core types for flow output monitoring. This crate defines the records and
//! statistics that the flowwatch monitor produces, so that dashboards, loggers
//! and test harnesses can consume them without pulling in an async runtime or
//! a broker client.
//!
//! ## Features
//!
//! - `serde`: `Serialize`/`Deserialize` for every type
//!
//! ## Example
//!
//! ```rust
//! use flowwatch_types::{match_topic, OutputRecord, Payload};
//!
//! let flow = match_topic("acme-alice-ingest-topic").expect("flow topic");
//! let record = OutputRecord::new(flow, "acme-alice-ingest-topic", Payload::from_bytes(b"{}"));
//!
//! assert_eq!(record.flow_id.as_str(), "acme-alice-ingest");
//! assert!(record.payload.is_json());
//! ```

mod flow;
mod record;
mod status;

pub use flow::*;
pub use record::*;
pub use status::*;

/// Current time in milliseconds since the Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
