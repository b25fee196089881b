//! Flow identifiers and the flow-topic naming convention.
//!
//! Every flow in the deployment writes to exactly one topic named
//! `<org>-<user>-<node>-topic`. The functions here map between the two.

use std::fmt;

/// Suffix carried by every flow output topic.
pub const FLOW_TOPIC_SUFFIX: &str = "-topic";

/// Minimum number of `-` separated segments in a flow identifier.
const MIN_SEGMENTS: usize = 3;

/// Identifies a logical flow by its `org-user-node` triple.
///
/// The node segment may itself contain hyphens, so `acme-alice-etl-stage2`
/// is org `acme`, user `alice`, node `etl-stage2`.
///
/// # Example
///
/// ```rust
/// use flowwatch_types::FlowId;
///
/// let flow = FlowId::from_topic("acme-alice-ingest-topic").unwrap();
/// assert_eq!(flow.as_str(), "acme-alice-ingest");
/// assert_eq!(flow.org(), "acme");
/// assert_eq!(flow.topic_name(), "acme-alice-ingest-topic");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct FlowId(String);

impl FlowId {
    /// Extract the flow identifier from a topic name.
    ///
    /// Returns `None` unless the name ends with [`FLOW_TOPIC_SUFFIX`] and the
    /// prefix has at least three non-empty segments.
    pub fn from_topic(topic: &str) -> Option<Self> {
        topic.strip_suffix(FLOW_TOPIC_SUFFIX).and_then(Self::parse)
    }

    /// Validate a bare `org-user-node` identifier.
    pub fn parse(text: &str) -> Option<Self> {
        let segments: Vec<&str> = text.split('-').collect();
        if segments.len() < MIN_SEGMENTS || segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self(text.to_string()))
    }

    /// Best-effort identifier for a topic that does not follow the convention.
    ///
    /// Strips the suffix if present and keeps whatever remains. Only used when
    /// a record must be kept even though it cannot be classified.
    pub fn from_topic_lossy(topic: &str) -> Self {
        Self(topic.strip_suffix(FLOW_TOPIC_SUFFIX).unwrap_or(topic).to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The topic this flow writes to.
    pub fn topic_name(&self) -> String {
        format!("{}{}", self.0, FLOW_TOPIC_SUFFIX)
    }

    /// Organization segment.
    pub fn org(&self) -> &str {
        self.segment(0)
    }

    /// User segment.
    pub fn user(&self) -> &str {
        self.segment(1)
    }

    /// Node segment (everything after the user).
    pub fn node(&self) -> &str {
        self.0.splitn(MIN_SEGMENTS, '-').nth(2).unwrap_or_default()
    }

    fn segment(&self, index: usize) -> &str {
        self.0.split('-').nth(index).unwrap_or_default()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FlowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Decide whether a topic belongs to the flow-output namespace.
///
/// This is the topic matcher used for subscription resolution and for
/// classifying every incoming record.
pub fn match_topic(topic: &str) -> Option<FlowId> {
    FlowId::from_topic(topic)
}
