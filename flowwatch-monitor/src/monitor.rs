//! The flow output monitor facade.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flowwatch_types::{
    match_topic, FlowId, MonitorState, MonitoringStatus, OutputRecord, Payload, TopicStatistics,
};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{OutputCache, DEFAULT_CAPACITY};
use crate::controller::{RecordSink, SubscriptionController};
use crate::dispatcher::{EventDispatcher, ListenerId, ListenerResult};
use crate::event::{EventKind, MonitorEvent};
use crate::transport::{RawRecord, TopicDirectory, Transport, DEFAULT_EVENT_BUFFER};
use crate::MonitorError;

/// Tunables for a [`FlowOutputMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Records retained in the output cache. Must be positive.
    pub capacity: usize,
    /// Buffer size of channels returned by [`FlowOutputMonitor::events`].
    pub event_buffer: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Classifies, caches and announces every record the controller pumps.
struct Pipeline {
    cache: RwLock<OutputCache>,
    dispatcher: EventDispatcher,
}

impl Pipeline {
    fn classify(&self, topic: &str, last_known: Option<FlowId>) -> FlowId {
        if let Some(flow) = match_topic(topic) {
            return flow;
        }
        debug!(topic, "Record topic does not match the flow convention");
        self.dispatcher
            .emit(&MonitorEvent::MonitorError(MonitorError::ClassificationMismatch {
                topic: topic.to_string(),
            }));
        last_known.unwrap_or_else(|| FlowId::from_topic_lossy(topic))
    }
}

impl RecordSink for Pipeline {
    fn on_record(&self, raw: RawRecord, last_known: Option<FlowId>) {
        let flow_id = self.classify(&raw.topic, last_known);
        let payload = Payload::from_bytes(&raw.payload);

        let mut record = OutputRecord::new(flow_id, raw.topic, payload)
            .with_position(raw.partition, raw.offset)
            .with_broker_timestamp(raw.timestamp_ms);
        if let Some(key) = raw.key {
            record = record.with_key(String::from_utf8_lossy(&key).into_owned());
        }

        let stored = self.cache.write().record(record);
        self.dispatcher.emit(&MonitorEvent::FlowOutput(stored));
    }

    fn on_connected(&self) {
        self.dispatcher.emit(&MonitorEvent::MonitorConnected);
    }

    fn on_transport_error(&self, error: MonitorError) {
        warn!(error = %error, "Transport reported an error");
        self.dispatcher.emit(&MonitorEvent::MonitorError(error));
    }
}

/// Live view over every flow output topic.
///
/// Discovers topics named `<org>-<user>-<node>-topic`, keeps one shared
/// subscription to all of them, retains the most recent records in a bounded
/// cache and emits [`MonitorEvent`]s to registered listeners.
///
/// Listeners run synchronously on the ingestion task and must not block.
///
/// # Example
///
/// ```rust
/// use flowwatch_monitor::{EventKind, FlowOutputMonitor, MemoryBroker};
///
/// # tokio_test::block_on(async {
/// let broker = MemoryBroker::new();
/// broker.create_topic("acme-alice-ingest-topic");
///
/// let monitor = FlowOutputMonitor::builder()
///     .capacity(100)
///     .directory(broker.clone())
///     .transport(broker.clone())
///     .build()
///     .unwrap();
///
/// monitor
///     .on(EventKind::FlowOutput, |event| {
///         if let Some(record) = event.as_output() {
///             println!("{}: {}", record.flow_id, record.payload.preview(80));
///         }
///         Ok(())
///     })
///     .unwrap();
///
/// let topics = monitor.start_monitoring().await.unwrap();
/// assert_eq!(topics, vec!["acme-alice-ingest-topic"]);
///
/// monitor.disconnect().await.unwrap();
/// # });
/// ```
pub struct FlowOutputMonitor {
    pipeline: Arc<Pipeline>,
    controller: SubscriptionController,
    config: MonitorConfig,
    disposed: AtomicBool,
}

impl FlowOutputMonitor {
    /// Create a builder for configuring the monitor.
    pub fn builder() -> FlowOutputMonitorBuilder {
        FlowOutputMonitorBuilder::new()
    }

    /// Resolve the flow-topic set and start ingesting.
    ///
    /// Emits `MonitoringStarted` with the subscribed topics on success. An
    /// empty topic set is not an error. Fails with `AlreadyMonitoring` if a
    /// subscription is starting or live.
    pub async fn start_monitoring(&self) -> Result<Vec<String>, MonitorError> {
        self.ensure_live()?;
        let topics = self.report(self.controller.start().await)?;
        info!(topics = topics.len(), "Flow output monitoring started");
        self.emit_started(&topics);
        Ok(topics)
    }

    /// Stop ingesting. Cached records and statistics are kept.
    ///
    /// Idempotent, and a no-op before `start_monitoring`.
    pub async fn stop_monitoring(&self) -> Result<(), MonitorError> {
        self.ensure_live()?;
        self.controller.stop().await;
        Ok(())
    }

    /// Re-resolve the flow-topic set and replace the subscription.
    ///
    /// Emits `MonitoringStarted` with the new topic set on success.
    pub async fn resubscribe(&self) -> Result<Vec<String>, MonitorError> {
        self.ensure_live()?;
        let topics = self.report(self.controller.resubscribe().await)?;
        self.emit_started(&topics);
        Ok(topics)
    }

    /// Resubscribe only if flow topics were created or deleted.
    ///
    /// Returns whether the subscription changed.
    pub async fn refresh(&self) -> Result<bool, MonitorError> {
        self.ensure_live()?;
        let changed = self.report(self.controller.refresh().await)?;
        if changed {
            self.emit_started(&self.controller.topics());
        }
        Ok(changed)
    }

    /// Stop monitoring and release the transport.
    ///
    /// Every later call other than the snapshot queries fails with
    /// `MonitorDisposed`, including a second `disconnect`.
    pub async fn disconnect(&self) -> Result<(), MonitorError> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(MonitorError::MonitorDisposed);
        }
        info!("Disconnecting flow output monitor");
        self.report(self.controller.shutdown().await)
    }

    /// Register a listener for every event of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Result<ListenerId, MonitorError>
    where
        F: Fn(&MonitorEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.ensure_live()?;
        Ok(self.pipeline.dispatcher.on(kind, handler))
    }

    /// Register a listener for outputs of one flow.
    pub fn on_flow<F>(
        &self,
        flow_id: impl Into<String>,
        handler: F,
    ) -> Result<ListenerId, MonitorError>
    where
        F: Fn(&MonitorEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.ensure_live()?;
        Ok(self.pipeline.dispatcher.on_flow(flow_id, handler))
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> Result<bool, MonitorError> {
        self.ensure_live()?;
        Ok(self.pipeline.dispatcher.off(id))
    }

    /// Forward every event into a bounded channel.
    ///
    /// Events are dropped when the channel is full or the receiver is gone.
    pub fn event_channel(
        &self,
        buffer: usize,
    ) -> Result<mpsc::Receiver<MonitorEvent>, MonitorError> {
        self.ensure_live()?;
        let (tx, rx) = mpsc::channel(buffer.max(1));
        for kind in EventKind::ALL {
            let tx = tx.clone();
            self.pipeline.dispatcher.on(kind, move |event| {
                let _ = tx.try_send(event.clone());
                Ok(())
            });
        }
        Ok(rx)
    }

    /// [`event_channel`](Self::event_channel) with the configured buffer size.
    pub fn events(&self) -> Result<mpsc::Receiver<MonitorEvent>, MonitorError> {
        self.event_channel(self.config.event_buffer)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MonitorState {
        self.controller.state()
    }

    /// True while a subscription is live.
    pub fn is_monitoring(&self) -> bool {
        matches!(
            self.controller.state(),
            MonitorState::Active | MonitorState::Resubscribing
        )
    }

    /// Whether `disconnect` has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Snapshot of the monitor.
    pub fn monitoring_status(&self) -> MonitoringStatus {
        let state = self.controller.state();
        let topics = self.controller.topics();
        let cache = self.pipeline.cache.read();
        MonitoringStatus {
            is_monitoring: matches!(state, MonitorState::Active | MonitorState::Resubscribing),
            state,
            total_outputs: cache.total_recorded(),
            topic_count: topics.len(),
            topics,
            cached_outputs: cache.len(),
            capacity: cache.capacity(),
        }
    }

    /// Per-topic statistics for every topic that produced a record.
    pub fn topic_statistics(&self) -> BTreeMap<String, TopicStatistics> {
        self.pipeline.cache.read().statistics_by_topic()
    }

    /// Up to `n` most recent records, newest first.
    pub fn latest_outputs(&self, n: usize) -> Vec<Arc<OutputRecord>> {
        self.pipeline.cache.read().latest(n)
    }

    /// Every retained record, oldest first.
    pub fn all_outputs(&self) -> Vec<Arc<OutputRecord>> {
        self.pipeline.cache.read().all()
    }

    /// The configuration this monitor was built with.
    pub fn config(&self) -> MonitorConfig {
        self.config
    }

    fn ensure_live(&self) -> Result<(), MonitorError> {
        if self.is_disposed() {
            Err(MonitorError::MonitorDisposed)
        } else {
            Ok(())
        }
    }

    /// Pass a result through, emitting reportable errors to listeners.
    fn report<T>(&self, result: Result<T, MonitorError>) -> Result<T, MonitorError> {
        if let Err(e) = &result {
            if e.is_reportable() {
                warn!(error = %e, "Monitor operation failed");
                self.pipeline
                    .dispatcher
                    .emit(&MonitorEvent::MonitorError(e.clone()));
            } else {
                debug!(error = %e, "Monitor operation rejected");
            }
        }
        result
    }

    fn emit_started(&self, topics: &[String]) {
        self.pipeline.dispatcher.emit(&MonitorEvent::MonitoringStarted {
            topics: topics.to_vec(),
        });
    }
}

impl std::fmt::Debug for FlowOutputMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowOutputMonitor")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Builder for configuring a [`FlowOutputMonitor`].
#[derive(Default)]
pub struct FlowOutputMonitorBuilder {
    config: MonitorConfig,
    directory: Option<Arc<dyn TopicDirectory>>,
    transport: Option<Arc<dyn Transport>>,
}

impl FlowOutputMonitorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the output cache capacity.
    ///
    /// Defaults to 500 if not specified.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set the buffer size used by [`FlowOutputMonitor::events`].
    pub fn event_buffer(mut self, buffer: usize) -> Self {
        self.config.event_buffer = buffer;
        self
    }

    /// Set the topic directory used to resolve flow topics.
    pub fn directory(mut self, directory: impl TopicDirectory + 'static) -> Self {
        self.directory = Some(Arc::new(directory));
        self
    }

    /// Set the transport that carries the shared subscription.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Set a directory that is shared with other owners.
    pub fn shared_directory(mut self, directory: Arc<dyn TopicDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Set a transport that is shared with other owners.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the monitor.
    ///
    /// Fails with `InvalidConfig` on a zero capacity or a missing collaborator.
    pub fn build(self) -> Result<FlowOutputMonitor, MonitorError> {
        let capacity = NonZeroUsize::new(self.config.capacity).ok_or_else(|| {
            MonitorError::InvalidConfig("capacity must be greater than zero".to_string())
        })?;
        let directory = self.directory.ok_or_else(|| {
            MonitorError::InvalidConfig("no topic directory configured".to_string())
        })?;
        let transport = self
            .transport
            .ok_or_else(|| MonitorError::InvalidConfig("no transport configured".to_string()))?;

        let pipeline = Arc::new(Pipeline {
            cache: RwLock::new(OutputCache::new(capacity)),
            dispatcher: EventDispatcher::new(),
        });
        let controller = SubscriptionController::new(directory, transport, pipeline.clone());

        Ok(FlowOutputMonitor {
            pipeline,
            controller,
            config: self.config,
            disposed: AtomicBool::new(false),
        })
    }
}

impl std::fmt::Debug for FlowOutputMonitorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowOutputMonitorBuilder")
            .field("config", &self.config)
            .field("directory", &self.directory.is_some())
            .field("transport", &self.transport.is_some())
            .finish()
    }
}
