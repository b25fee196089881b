//! Fan-out of monitor events to registered listeners.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, warn};

use crate::event::{EventKind, MonitorEvent};
use crate::MonitorError;

/// What a listener returns. An `Err` is reported as a `MonitorError` event.
pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Handler = dyn Fn(&MonitorEvent) -> ListenerResult + Send + Sync;

/// Identifies a registered listener so it can be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    kind: EventKind,
    /// Only deliver `FlowOutput` records from this flow.
    flow: Option<String>,
    handler: Box<Handler>,
}

impl Listener {
    fn accepts(&self, event: &MonitorEvent) -> bool {
        if event.kind() != self.kind {
            return false;
        }
        match (&self.flow, event) {
            (None, _) => true,
            (Some(flow), MonitorEvent::FlowOutput(record)) => record.flow_id.as_str() == flow,
            (Some(_), _) => false,
        }
    }

    /// Name of the channel this listener is attached to, for error reports.
    fn channel(&self) -> String {
        match &self.flow {
            Some(flow) => format!("output:{}", flow),
            None => self.kind.to_string(),
        }
    }

    fn invoke(&self, event: &MonitorEvent) -> Result<(), String> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(event))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(panic_message(payload.as_ref())),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

/// Registry of listeners and synchronous event delivery.
///
/// Delivery follows registration order, with generic listeners ahead of
/// flow-scoped ones. A listener that fails never stops delivery to the
/// others; each failure is reported once as a `MonitorError` event that only
/// `MonitorError` listeners see.
///
/// # Example
///
/// ```rust
/// use flowwatch_monitor::{EventDispatcher, EventKind, MonitorEvent};
///
/// let dispatcher = EventDispatcher::new();
/// let id = dispatcher.on(EventKind::MonitorConnected, |_event| {
///     println!("connected");
///     Ok(())
/// });
///
/// dispatcher.emit(&MonitorEvent::MonitorConnected);
/// assert!(dispatcher.off(id));
/// ```
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<Listener>>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    /// Create a dispatcher with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&MonitorEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.register(kind, None, Box::new(handler))
    }

    /// Register a listener for `FlowOutput` events from one flow only.
    pub fn on_flow<F>(&self, flow_id: impl Into<String>, handler: F) -> ListenerId
    where
        F: Fn(&MonitorEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.register(EventKind::FlowOutput, Some(flow_id.into()), Box::new(handler))
    }

    fn register(&self, kind: EventKind, flow: Option<String>, handler: Box<Handler>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Arc::new(Listener {
            id,
            kind,
            flow,
            handler,
        }));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver an event to every listener that accepts it.
    ///
    /// Never fails and never panics because of a listener.
    pub fn emit(&self, event: &MonitorEvent) {
        let failures = self.deliver(event);
        if failures.is_empty() {
            return;
        }

        if event.kind() == EventKind::MonitorError {
            for failure in failures {
                error!(error = %failure, "monitor-error listener failed");
            }
            return;
        }

        for failure in failures {
            warn!(error = %failure, "listener failed");
            for nested in self.deliver(&MonitorEvent::MonitorError(failure)) {
                error!(error = %nested, "monitor-error listener failed");
            }
        }
    }

    fn deliver(&self, event: &MonitorEvent) -> Vec<MonitorError> {
        // Snapshot so listeners can register or remove listeners re-entrantly
        let mut targets: Vec<Arc<Listener>> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.accepts(event))
            .cloned()
            .collect();
        targets.sort_by_key(|l| l.flow.is_some());

        targets
            .iter()
            .filter_map(|listener| {
                listener
                    .invoke(event)
                    .err()
                    .map(|message| MonitorError::ListenerFailure {
                        event: listener.channel(),
                        message,
                    })
            })
            .collect()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
