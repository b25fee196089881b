//! Events emitted by the monitor.

use std::fmt;
use std::sync::Arc;

use flowwatch_types::OutputRecord;

use crate::MonitorError;

/// Something that happened in the monitor.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Monitoring started on the resolved topic set (possibly empty).
    MonitoringStarted { topics: Vec<String> },

    /// A record was ingested and cached.
    ///
    /// Also delivered to flow-scoped listeners whose flow matches.
    FlowOutput(Arc<OutputRecord>),

    /// The transport reported a live connection.
    MonitorConnected,

    /// A failure the caller should know about.
    MonitorError(MonitorError),
}

impl MonitorEvent {
    /// The kind of this event, used for listener routing.
    pub fn kind(&self) -> EventKind {
        match self {
            MonitorEvent::MonitoringStarted { .. } => EventKind::MonitoringStarted,
            MonitorEvent::FlowOutput(_) => EventKind::FlowOutput,
            MonitorEvent::MonitorConnected => EventKind::MonitorConnected,
            MonitorEvent::MonitorError(_) => EventKind::MonitorError,
        }
    }

    /// The record carried by a `FlowOutput` event.
    pub fn as_output(&self) -> Option<&Arc<OutputRecord>> {
        match self {
            MonitorEvent::FlowOutput(record) => Some(record),
            _ => None,
        }
    }

    /// The error carried by a `MonitorError` event.
    pub fn as_error(&self) -> Option<&MonitorError> {
        match self {
            MonitorEvent::MonitorError(error) => Some(error),
            _ => None,
        }
    }
}

/// Event kinds listeners can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MonitoringStarted,
    FlowOutput,
    MonitorConnected,
    MonitorError,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 4] = [
        EventKind::MonitoringStarted,
        EventKind::FlowOutput,
        EventKind::MonitorConnected,
        EventKind::MonitorError,
    ];

    /// Stable kebab-case name, as used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::MonitoringStarted => "monitoring-started",
            EventKind::FlowOutput => "flow-output",
            EventKind::MonitorConnected => "monitor-connected",
            EventKind::MonitorError => "monitor-error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
