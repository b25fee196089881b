//! Per-topic statistics and derived monitoring status.

use std::fmt;

/// Message counters for a single flow topic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TopicStatistics {
    /// Topic name.
    pub topic: String,

    /// Messages seen on this topic since the monitor was created.
    ///
    /// Never decreases; cache eviction does not touch it.
    pub message_count: u64,

    /// Local arrival time of the most recent message (ms since Unix epoch).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_message_ms: Option<u64>,
}

impl TopicStatistics {
    /// Create zeroed statistics for a topic.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            message_count: 0,
            last_message_ms: None,
        }
    }

    /// Count one more message arriving at `received_at_ms`.
    pub fn observe(&mut self, received_at_ms: u64) {
        self.message_count += 1;
        self.last_message_ms = Some(received_at_ms);
    }
}

/// Lifecycle state of the subscription controller.
///
/// ```text
/// Idle ──▶ Starting ──▶ Active ◀──▶ Resubscribing
///  ▲           │           │              │
///  └───────────┘           ▼              ▼
///                       Stopped ◀─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MonitorState {
    /// Never started, or the last start failed, or the connection was lost.
    #[default]
    Idle,
    /// Resolving topics and subscribing.
    Starting,
    /// Subscribed (possibly to an empty topic set) and ingesting.
    Active,
    /// Swapping the subscription for a freshly resolved topic set.
    Resubscribing,
    /// Stopped by the caller.
    Stopped,
}

impl MonitorState {
    /// Whether a subscription lifecycle is currently in progress.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            MonitorState::Starting | MonitorState::Active | MonitorState::Resubscribing
        )
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonitorState::Idle => "idle",
            MonitorState::Starting => "starting",
            MonitorState::Active => "active",
            MonitorState::Resubscribing => "resubscribing",
            MonitorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of the monitor, derived on demand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitoringStatus {
    /// True while records are being ingested.
    pub is_monitoring: bool,

    /// Controller lifecycle state.
    pub state: MonitorState,

    /// Records ever ingested, independent of eviction.
    pub total_outputs: u64,

    /// Number of distinct topics currently subscribed.
    pub topic_count: usize,

    /// The subscribed topics, sorted.
    pub topics: Vec<String>,

    /// Records currently retained in the output cache.
    pub cached_outputs: usize,

    /// Output cache capacity.
    pub capacity: usize,
}
