//! Output records - one message observed on a flow topic.

use crate::FlowId;

/// Message body of an output record.
///
/// Payloads that parse as JSON are kept structured; anything else is kept
/// as the raw bytes received from the broker.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "value", rename_all = "snake_case"))]
pub enum Payload {
    /// Well-formed JSON document.
    Json(serde_json::Value),
    /// Opaque bytes (not JSON, possibly not UTF-8).
    Raw(Vec<u8>),
}

impl Payload {
    /// Classify raw message bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Raw(bytes.to_vec()),
        }
    }

    /// The structured value, if the payload parsed as JSON.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    /// The raw bytes, if the payload did not parse.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Json(_) => None,
            Payload::Raw(bytes) => Some(bytes),
        }
    }

    /// Check whether the payload parsed as JSON.
    pub fn is_json(&self) -> bool {
        matches!(self, Payload::Json(_))
    }

    /// Short human-readable rendering, truncated to `max_chars` characters.
    pub fn preview(&self, max_chars: usize) -> String {
        let full = match self {
            Payload::Json(value) => value.to_string(),
            Payload::Raw(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        };
        if full.chars().count() <= max_chars {
            return full;
        }
        let mut truncated: String = full.chars().take(max_chars).collect();
        truncated.push_str("...");
        truncated
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::from_bytes(bytes)
    }
}

/// One message ingested from a flow's topic, enriched with arrival metadata.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputRecord {
    /// Flow that produced the message.
    pub flow_id: FlowId,

    /// Topic the message was read from.
    pub topic: String,

    /// Partition the message was read from.
    pub partition: i32,

    /// Offset within the partition.
    pub offset: i64,

    /// Message key, decoded lossily as UTF-8.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub key: Option<String>,

    /// Message body.
    pub payload: Payload,

    /// Local arrival time in milliseconds since the Unix epoch.
    ///
    /// Taken from this process's clock, never from the broker, and never
    /// earlier than the previous record's arrival time.
    pub received_at_ms: u64,

    /// Broker-assigned timestamp, if the transport provided one.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub broker_timestamp_ms: Option<i64>,

    /// Ingestion sequence number (number of records ingested before this one).
    pub sequence: u64,
}

impl OutputRecord {
    /// Create a record with the current local arrival time.
    ///
    /// `sequence` is left at zero; the output cache assigns it on insertion.
    pub fn new(flow_id: FlowId, topic: impl Into<String>, payload: Payload) -> Self {
        Self {
            flow_id,
            topic: topic.into(),
            partition: 0,
            offset: 0,
            key: None,
            payload,
            received_at_ms: crate::current_timestamp_ms(),
            broker_timestamp_ms: None,
            sequence: 0,
        }
    }

    /// Set the message key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the partition and offset the record was read from.
    pub fn with_position(mut self, partition: i32, offset: i64) -> Self {
        self.partition = partition;
        self.offset = offset;
        self
    }

    /// Set the broker timestamp.
    pub fn with_broker_timestamp(mut self, timestamp_ms: Option<i64>) -> Self {
        self.broker_timestamp_ms = timestamp_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_payload_is_parsed() {
        let payload = Payload::from_bytes(br#"{"status":"success"}"#);
        assert!(payload.is_json());
        assert_eq!(payload.as_json().unwrap()["status"], "success");
    }

    #[test]
    fn plain_text_is_kept_raw() {
        let payload = Payload::from_bytes(b"Hello from the flow!");
        assert_eq!(payload.as_bytes(), Some(&b"Hello from the flow!"[..]));
    }

    #[test]
    fn invalid_utf8_is_kept_raw() {
        let payload = Payload::from_bytes(&[0xff, 0xfe, 0x00]);
        assert_eq!(payload.as_bytes().unwrap().len(), 3);
    }

    #[test]
    fn preview_truncates_long_payloads() {
        let payload = Payload::Raw(b"abcdefghij".to_vec());
        assert_eq!(payload.preview(4), "abcd...");
        assert_eq!(payload.preview(10), "abcdefghij");
    }

    #[test]
    fn builder_methods_set_metadata() {
        let flow = FlowId::parse("a-b-c").unwrap();
        let record = OutputRecord::new(flow, "a-b-c-topic", Payload::Raw(vec![]))
            .with_key("k1")
            .with_position(3, 42)
            .with_broker_timestamp(Some(1_700_000_000_000));

        assert_eq!(record.key.as_deref(), Some("k1"));
        assert_eq!(record.partition, 3);
        assert_eq!(record.offset, 42);
        assert_eq!(record.broker_timestamp_ms, Some(1_700_000_000_000));
        assert!(record.received_at_ms > 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let flow = FlowId::parse("a-b-c").unwrap();
        let record = OutputRecord::new(flow, "a-b-c-topic", Payload::from_bytes(b"[1,2]"));

        let json = serde_json::to_string(&record).unwrap();
        let parsed: OutputRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(record, parsed);
    }
}
