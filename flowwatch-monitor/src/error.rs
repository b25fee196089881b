//! Error types for the flow output monitor.

use thiserror::Error;

/// Errors produced by the monitor and its collaborators.
///
/// Errors are `Clone` so the same value can be returned to a caller and
/// delivered to `MonitorError` listeners.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// Listing topics failed.
    #[error("Topic directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// A subscription lifecycle is already in progress.
    #[error("Monitor is already running")]
    AlreadyMonitoring,

    /// The operation needs an active subscription.
    #[error("Monitor is not running")]
    NotMonitoring,

    /// The monitor was disconnected.
    #[error("Monitor has been disconnected")]
    MonitorDisposed,

    /// A listener returned an error or panicked.
    #[error("Listener for {event} failed: {message}")]
    ListenerFailure { event: String, message: String },

    /// A record arrived on a topic the matcher does not recognise.
    #[error("Record on '{topic}' does not match the flow topic convention")]
    ClassificationMismatch { topic: String },

    /// The transport reported an error.
    #[error("Transport error: {message}")]
    Transport { message: String, fatal: bool },

    /// Start or resubscribe was interrupted by stop or disconnect.
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MonitorError {
    /// Shorthand for a non-fatal transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        MonitorError::Transport {
            message: message.into(),
            fatal: false,
        }
    }

    /// Whether this error should also be delivered to `MonitorError` listeners
    /// when it is returned from a setup operation.
    ///
    /// Local state-transition errors are only returned.
    pub fn is_reportable(&self) -> bool {
        !matches!(
            self,
            MonitorError::AlreadyMonitoring
                | MonitorError::NotMonitoring
                | MonitorError::MonitorDisposed
                | MonitorError::Cancelled
                | MonitorError::InvalidConfig(_)
        )
    }
}
