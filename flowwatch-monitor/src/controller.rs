//! Ownership of the single shared subscription.
//!
//! The controller resolves the flow-topic set through the directory and the
//! topic matcher, subscribes the transport to it, and runs one pump task per
//! subscription that hands every transport event to a [`RecordSink`].
//!
//! Lifecycle operations are cancellable: `stop` bumps an epoch published on a
//! watch channel, and any `start`/`resubscribe` still in flight observes the
//! bump, releases what it acquired and returns [`MonitorError::Cancelled`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use flowwatch_types::{match_topic, FlowId, MonitorState};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transport::{RawRecord, TopicDirectory, Transport, TransportEvent, TransportEvents};
use crate::MonitorError;

/// Flow topics keyed by topic name.
pub type ResolvedTopics = BTreeMap<String, FlowId>;

/// Receives everything the pump pulls from the transport.
///
/// Called from the pump task, one event at a time.
pub trait RecordSink: Send + Sync {
    /// A record arrived. `last_known` is the flow id the topic had when it
    /// was last resolved.
    fn on_record(&self, record: RawRecord, last_known: Option<FlowId>);

    /// The transport reported a connection.
    fn on_connected(&self);

    /// The transport reported an error.
    fn on_transport_error(&self, error: MonitorError);
}

#[derive(Debug, Default)]
struct Lifecycle {
    state: MonitorState,
    topics: ResolvedTopics,
    /// Incremented for every subscription handed to a pump.
    generation: u64,
    /// A subscription that died before it was committed.
    lost: Option<u64>,
}

#[derive(Debug)]
struct Shared {
    lifecycle: Mutex<Lifecycle>,
    epoch: watch::Sender<u64>,
    /// Flow ids of every topic ever resolved. Never shrinks.
    known_flows: RwLock<HashMap<String, FlowId>>,
}

impl Shared {
    fn current_epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    fn bump_epoch(&self) -> u64 {
        let mut epoch = 0;
        self.epoch.send_modify(|e| {
            *e += 1;
            epoch = *e;
        });
        epoch
    }

    /// Finish a transition, unless a later operation superseded it.
    fn settle(&self, epoch: u64, state: MonitorState) {
        let mut lifecycle = self.lifecycle.lock();
        if self.current_epoch() != epoch {
            return;
        }
        lifecycle.state = state;
        if state != MonitorState::Active {
            lifecycle.topics.clear();
        }
    }

    /// The connection behind subscription `generation` is gone for good.
    ///
    /// Returns `true` if this moved the controller to `Idle`, in which case
    /// the caller owns releasing the subscription.
    fn lose_connection(&self, generation: u64) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if generation > lifecycle.generation {
            lifecycle.lost = Some(generation);
            return false;
        }
        if lifecycle.generation != generation || lifecycle.state != MonitorState::Active {
            return false;
        }
        warn!("Transport connection lost, monitor is idle");
        lifecycle.state = MonitorState::Idle;
        lifecycle.topics.clear();
        true
    }
}

/// Owns the one consumer-group subscription covering the flow-topic set.
pub struct SubscriptionController {
    shared: Arc<Shared>,
    directory: Arc<dyn TopicDirectory>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn RecordSink>,
    /// Serializes transport calls and owns the running pump.
    pump: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionController {
    /// Create an idle controller.
    pub fn new(
        directory: Arc<dyn TopicDirectory>,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(Lifecycle::default()),
                epoch,
                known_flows: RwLock::new(HashMap::new()),
            }),
            directory,
            transport,
            sink,
            pump: tokio::sync::Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MonitorState {
        self.shared.lifecycle.lock().state
    }

    /// Topics of the current subscription, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.shared.lifecycle.lock().topics.keys().cloned().collect()
    }

    /// Flow id a topic had when it was last resolved.
    pub fn last_known_flow(&self, topic: &str) -> Option<FlowId> {
        self.shared.known_flows.read().get(topic).cloned()
    }

    /// List the directory and keep the topics that match the flow convention.
    pub async fn resolve_topics(&self) -> Result<ResolvedTopics, MonitorError> {
        let topics = self.directory.list_topics().await?;
        Ok(topics
            .into_iter()
            .filter_map(|topic| match_topic(&topic).map(|flow| (topic, flow)))
            .collect())
    }

    /// Resolve topics and subscribe to them.
    ///
    /// An empty topic set still leaves the controller `Active`, subscribed to
    /// nothing, so a later [`resubscribe`](Self::resubscribe) can pick up new
    /// topics. On failure the controller returns to `Idle`.
    pub async fn start(&self) -> Result<Vec<String>, MonitorError> {
        let (epoch, cancel) = self.begin(|state| match state {
            MonitorState::Idle | MonitorState::Stopped => Ok(MonitorState::Starting),
            _ => Err(MonitorError::AlreadyMonitoring),
        })?;
        info!("Starting flow output subscription");

        let result = match self.resolve_cancellable(cancel.clone()).await {
            Ok(resolved) => self.attach(epoch, cancel, resolved).await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.shared.settle(epoch, MonitorState::Idle);
        }
        result
    }

    /// Re-resolve topics and replace the subscription.
    ///
    /// Records still buffered in the old subscription are drained to the sink
    /// before the new one starts. If resolution fails the old subscription
    /// stays active; if subscribing fails the controller becomes `Idle`.
    pub async fn resubscribe(&self) -> Result<Vec<String>, MonitorError> {
        let (epoch, cancel) = self.begin(|state| match state {
            MonitorState::Active => Ok(MonitorState::Resubscribing),
            MonitorState::Starting | MonitorState::Resubscribing => {
                Err(MonitorError::AlreadyMonitoring)
            }
            MonitorState::Idle | MonitorState::Stopped => Err(MonitorError::NotMonitoring),
        })?;
        info!("Resubscribing to flow topics");

        let resolved = match self.resolve_cancellable(cancel.clone()).await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.shared.settle(epoch, MonitorState::Active);
                return Err(e);
            }
        };

        let result = self.attach(epoch, cancel, resolved).await;
        if result.is_err() {
            self.shared.settle(epoch, MonitorState::Idle);
        }
        result
    }

    /// Resubscribe only if the resolved topic set differs from the current one.
    ///
    /// Returns whether a resubscription happened.
    pub async fn refresh(&self) -> Result<bool, MonitorError> {
        if self.state() != MonitorState::Active {
            return Err(MonitorError::NotMonitoring);
        }
        let resolved: BTreeSet<String> = self.resolve_topics().await?.into_keys().collect();
        let current: BTreeSet<String> = self.topics().into_iter().collect();
        if resolved == current {
            return Ok(false);
        }
        debug!(
            added = ?resolved.difference(&current).collect::<Vec<_>>(),
            "Flow topic set changed"
        );
        self.resubscribe().await.map(|_| true)
    }

    /// Detach from the transport. Safe to call in any state, any number of times.
    ///
    /// Cancels an in-flight `start` or `resubscribe`.
    pub async fn stop(&self) {
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.state.is_running() {
                lifecycle.state = MonitorState::Stopped;
                lifecycle.topics.clear();
                self.shared.bump_epoch();
                info!("Stopping flow output subscription");
            }
        }

        let mut pump = self.pump.lock().await;
        self.detach(&mut pump).await;
    }

    /// Stop and release the transport connection.
    pub async fn shutdown(&self) -> Result<(), MonitorError> {
        self.stop().await;
        self.transport.close().await
    }

    /// Validate and apply a state transition, starting a new epoch.
    fn begin<F>(&self, transition: F) -> Result<(u64, watch::Receiver<u64>), MonitorError>
    where
        F: FnOnce(MonitorState) -> Result<MonitorState, MonitorError>,
    {
        let mut lifecycle = self.shared.lifecycle.lock();
        lifecycle.state = transition(lifecycle.state)?;
        let epoch = self.shared.bump_epoch();
        Ok((epoch, self.shared.epoch.subscribe()))
    }

    async fn resolve_cancellable(
        &self,
        cancel: watch::Receiver<u64>,
    ) -> Result<ResolvedTopics, MonitorError> {
        tokio::select! {
            biased;
            _ = cancelled(cancel) => Err(MonitorError::Cancelled),
            resolved = self.resolve_topics() => resolved,
        }
    }

    /// Swap the live subscription for one covering `resolved`.
    async fn attach(
        &self,
        epoch: u64,
        cancel: watch::Receiver<u64>,
        resolved: ResolvedTopics,
    ) -> Result<Vec<String>, MonitorError> {
        let mut pump = self.pump.lock().await;
        if self.shared.current_epoch() != epoch {
            return Err(MonitorError::Cancelled);
        }

        self.detach(&mut pump).await;

        let topics: BTreeSet<String> = resolved.keys().cloned().collect();
        self.shared
            .known_flows
            .write()
            .extend(resolved.iter().map(|(t, f)| (t.clone(), f.clone())));

        let generation = if topics.is_empty() {
            info!("No flow topics found, waiting for resubscription");
            None
        } else {
            let events = tokio::select! {
                biased;
                _ = cancelled(cancel) => {
                    self.release_transport().await;
                    return Err(MonitorError::Cancelled);
                }
                events = self.transport.subscribe(&topics) => events?,
            };
            let generation = {
                let mut lifecycle = self.shared.lifecycle.lock();
                lifecycle.lost = None;
                lifecycle.generation + 1
            };
            *pump = Some(tokio::spawn(run_pump(
                events,
                self.shared.clone(),
                self.transport.clone(),
                self.sink.clone(),
                generation,
            )));
            Some(generation)
        };

        let committed = {
            let mut lifecycle = self.shared.lifecycle.lock();
            if self.shared.current_epoch() != epoch {
                Err(MonitorError::Cancelled)
            } else if generation.is_some() && lifecycle.lost == generation {
                Err(MonitorError::Transport {
                    message: "connection lost while subscribing".to_string(),
                    fatal: true,
                })
            } else {
                lifecycle.state = MonitorState::Active;
                lifecycle.topics = resolved;
                if let Some(generation) = generation {
                    lifecycle.generation = generation;
                }
                Ok(())
            }
        };

        if let Err(e) = committed {
            self.detach(&mut pump).await;
            return Err(e);
        }

        info!(topics = topics.len(), "Subscribed to flow topics");
        Ok(topics.into_iter().collect())
    }

    /// Unsubscribe and wait for the pump to drain the closed stream.
    async fn detach(&self, pump: &mut Option<JoinHandle<()>>) {
        let Some(handle) = pump.take() else {
            return;
        };
        self.release_transport().await;
        if let Err(e) = handle.await {
            warn!(error = %e, "Record pump terminated abnormally");
        }
    }

    async fn release_transport(&self) {
        if let Err(e) = self.transport.unsubscribe().await {
            warn!(error = %e, "Failed to unsubscribe transport");
        }
    }
}

impl std::fmt::Debug for SubscriptionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionController")
            .field("state", &self.state())
            .field("topics", &self.topics())
            .finish()
    }
}

/// Resolves once the epoch moves past the one `rx` has seen.
async fn cancelled(mut rx: watch::Receiver<u64>) {
    // A dropped sender also counts as cancellation
    let _ = rx.changed().await;
}

/// Hand every event of one subscription to the sink, until the stream closes
/// or the transport reports a fatal error.
async fn run_pump(
    mut events: TransportEvents,
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn RecordSink>,
    generation: u64,
) {
    debug!(generation, "Record pump started");
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Record(record) => {
                let last_known = shared.known_flows.read().get(&record.topic).cloned();
                sink.on_record(record, last_known);
            }
            TransportEvent::Connected => sink.on_connected(),
            TransportEvent::Error { message, fatal } => {
                sink.on_transport_error(MonitorError::Transport { message, fatal });
                if fatal {
                    let owned = shared.lose_connection(generation).then_some(transport);
                    discard_remaining(&mut events, owned, generation).await;
                    break;
                }
            }
        }
    }
    debug!(generation, "Record pump finished");
}

/// Drain a dead subscription without ingesting anything from it.
///
/// When `transport` is given the subscription is released concurrently, so
/// the stream is guaranteed to close. Otherwise a concurrent `stop` or
/// resubscription is already releasing it.
async fn discard_remaining(
    events: &mut TransportEvents,
    transport: Option<Arc<dyn Transport>>,
    generation: u64,
) {
    let drain = async {
        let mut dropped = 0usize;
        while let Some(event) = events.recv().await {
            if matches!(event, TransportEvent::Record(_)) {
                dropped += 1;
            }
        }
        dropped
    };

    let dropped = match transport {
        Some(transport) => {
            let (released, dropped) = tokio::join!(transport.unsubscribe(), drain);
            if let Err(e) = released {
                warn!(error = %e, "Failed to unsubscribe after connection loss");
            }
            dropped
        }
        None => drain.await,
    };
    if dropped > 0 {
        debug!(generation, dropped, "Discarded records after connection loss");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBroker;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CollectingSink {
        records: Mutex<Vec<(RawRecord, Option<FlowId>)>>,
        connected: Mutex<usize>,
        errors: Mutex<Vec<MonitorError>>,
    }

    impl RecordSink for CollectingSink {
        fn on_record(&self, record: RawRecord, last_known: Option<FlowId>) {
            self.records.lock().push((record, last_known));
        }

        fn on_connected(&self) {
            *self.connected.lock() += 1;
        }

        fn on_transport_error(&self, error: MonitorError) {
            self.errors.lock().push(error);
        }
    }

    /// Wraps a broker so listing or subscribing can hang until cancelled.
    #[derive(Clone, Default)]
    struct Stalling {
        broker: MemoryBroker,
        stall_list: Arc<AtomicBool>,
        stall_subscribe: Arc<AtomicBool>,
        stalled: Arc<AtomicBool>,
    }

    impl Stalling {
        async fn stall(&self) {
            self.stalled.store(true, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        fn is_stalled(&self) -> bool {
            self.stalled.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TopicDirectory for Stalling {
        async fn list_topics(&self) -> Result<Vec<String>, MonitorError> {
            if self.stall_list.load(Ordering::SeqCst) {
                self.stall().await;
            }
            self.broker.list_topics().await
        }
    }

    #[async_trait]
    impl Transport for Stalling {
        async fn subscribe(
            &self,
            topics: &BTreeSet<String>,
        ) -> Result<TransportEvents, MonitorError> {
            if self.stall_subscribe.load(Ordering::SeqCst) {
                self.stall().await;
            }
            self.broker.subscribe(topics).await
        }

        async fn unsubscribe(&self) -> Result<(), MonitorError> {
            self.broker.unsubscribe().await
        }

        async fn close(&self) -> Result<(), MonitorError> {
            self.broker.close().await
        }
    }

    fn stalling_controller(stalling: &Stalling) -> Arc<SubscriptionController> {
        Arc::new(SubscriptionController::new(
            Arc::new(stalling.clone()),
            Arc::new(stalling.clone()),
            Arc::new(CollectingSink::default()),
        ))
    }

    fn controller(broker: &MemoryBroker) -> (SubscriptionController, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let controller = SubscriptionController::new(
            Arc::new(broker.clone()),
            Arc::new(broker.clone()),
            sink.clone(),
        );
        (controller, sink)
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn resolve_filters_through_matcher() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        broker.create_topic("__consumer_offsets");
        broker.create_topic("other-flow-topic");
        let (controller, _) = controller(&broker);

        let resolved = controller.resolve_topics().await.unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["a-b-c-topic"].as_str(), "a-b-c");
    }

    #[tokio::test]
    async fn start_subscribes_to_exactly_the_flow_topics() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        broker.create_topic("unrelated");
        let (controller, sink) = controller(&broker);

        let topics = controller.start().await.unwrap();

        assert_eq!(topics, vec!["a-b-c-topic"]);
        assert_eq!(controller.state(), MonitorState::Active);
        assert_eq!(
            broker.subscribed_topics().unwrap(),
            BTreeSet::from(["a-b-c-topic".to_string()])
        );
        eventually(|| *sink.connected.lock() == 1).await;
    }

    #[tokio::test]
    async fn start_with_no_topics_is_active_but_idle() {
        let broker = MemoryBroker::new();
        let (controller, _) = controller(&broker);

        let topics = controller.start().await.unwrap();

        assert!(topics.is_empty());
        assert_eq!(controller.state(), MonitorState::Active);
        assert!(broker.subscribed_topics().is_none());
    }

    #[tokio::test]
    async fn start_failure_returns_to_idle() {
        let broker = MemoryBroker::new();
        broker.set_directory_available(false);
        let (controller, _) = controller(&broker);

        let err = controller.start().await.unwrap_err();

        assert!(matches!(err, MonitorError::DirectoryUnavailable(_)));
        assert_eq!(controller.state(), MonitorState::Idle);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let broker = MemoryBroker::new();
        let (controller, _) = controller(&broker);

        controller.start().await.unwrap();
        assert_eq!(controller.start().await, Err(MonitorError::AlreadyMonitoring));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_safe_before_start() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let (controller, _) = controller(&broker);

        controller.stop().await;
        assert_eq!(controller.state(), MonitorState::Idle);

        controller.start().await.unwrap();
        controller.stop().await;
        controller.stop().await;

        assert_eq!(controller.state(), MonitorState::Stopped);
        assert!(broker.subscribed_topics().is_none());
        assert!(controller.topics().is_empty());
    }

    #[tokio::test]
    async fn restart_after_stop() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let (controller, _) = controller(&broker);

        controller.start().await.unwrap();
        controller.stop().await;
        controller.start().await.unwrap();

        assert_eq!(controller.state(), MonitorState::Active);
        assert_eq!(controller.topics(), vec!["a-b-c-topic"]);
    }

    #[tokio::test]
    async fn resubscribe_requires_active() {
        let broker = MemoryBroker::new();
        let (controller, _) = controller(&broker);

        assert_eq!(controller.resubscribe().await, Err(MonitorError::NotMonitoring));
    }

    #[tokio::test]
    async fn resubscribe_failure_keeps_old_subscription() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let (controller, _) = controller(&broker);
        controller.start().await.unwrap();

        broker.set_directory_available(false);
        let err = controller.resubscribe().await.unwrap_err();

        assert!(matches!(err, MonitorError::DirectoryUnavailable(_)));
        assert_eq!(controller.state(), MonitorState::Active);
        assert_eq!(controller.topics(), vec!["a-b-c-topic"]);
        assert!(broker.subscribed_topics().is_some());
    }

    #[tokio::test]
    async fn subscribe_failure_during_resubscribe_goes_idle() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let (controller, _) = controller(&broker);
        controller.start().await.unwrap();

        broker.set_subscribe_failure(Some("broker rejected subscription".into()));
        assert!(controller.resubscribe().await.is_err());

        assert_eq!(controller.state(), MonitorState::Idle);
        assert!(controller.topics().is_empty());
    }

    #[tokio::test]
    async fn resubscribe_drains_buffered_records() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let (controller, sink) = controller(&broker);
        controller.start().await.unwrap();

        for n in 0..50 {
            broker.publish("a-b-c-topic", None, format!("{}", n)).await;
        }
        controller.resubscribe().await.unwrap();

        // Everything published before the swap was handed to the sink
        assert_eq!(sink.records.lock().len(), 50);
    }

    #[tokio::test]
    async fn refresh_only_resubscribes_on_change() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let (controller, _) = controller(&broker);
        controller.start().await.unwrap();

        assert!(!controller.refresh().await.unwrap());

        broker.create_topic("d-e-f-topic");
        assert!(controller.refresh().await.unwrap());
        assert_eq!(controller.topics(), vec!["a-b-c-topic", "d-e-f-topic"]);
    }

    #[tokio::test]
    async fn records_carry_last_known_flow() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let (controller, sink) = controller(&broker);
        controller.start().await.unwrap();

        broker.publish("a-b-c-topic", None, "x").await;
        eventually(|| !sink.records.lock().is_empty()).await;

        let records = sink.records.lock();
        assert_eq!(records[0].1.as_ref().map(FlowId::as_str), Some("a-b-c"));
    }

    #[tokio::test]
    async fn fatal_transport_error_goes_idle() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let (controller, sink) = controller(&broker);
        controller.start().await.unwrap();

        broker
            .inject(TransportEvent::Error {
                message: "broker gone".into(),
                fatal: true,
            })
            .await;

        eventually(|| controller.state() == MonitorState::Idle).await;
        assert_eq!(sink.errors.lock().len(), 1);

        // A fresh start is allowed afterwards
        controller.start().await.unwrap();
        assert_eq!(controller.state(), MonitorState::Active);
    }

    #[tokio::test]
    async fn nothing_is_ingested_after_fatal_error() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let (controller, sink) = controller(&broker);
        controller.start().await.unwrap();

        broker.publish("a-b-c-topic", None, "before").await;
        eventually(|| sink.records.lock().len() == 1).await;

        broker
            .inject(TransportEvent::Error {
                message: "broker gone".into(),
                fatal: true,
            })
            .await;
        // Queued behind the error, or published after the release
        broker.publish("a-b-c-topic", None, "late").await;
        eventually(|| controller.state() == MonitorState::Idle).await;
        eventually(|| broker.subscribed_topics().is_none()).await;
        broker.publish("a-b-c-topic", None, "later").await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.records.lock().len(), 1);
        assert_eq!(sink.records.lock()[0].0.payload, b"before");
    }

    #[tokio::test]
    async fn stop_cancels_start_while_resolving() {
        let stalling = Stalling::default();
        stalling.broker.create_topic("a-b-c-topic");
        stalling.stall_list.store(true, Ordering::SeqCst);
        let controller = stalling_controller(&stalling);

        let start = tokio::spawn({
            let controller = controller.clone();
            async move { controller.start().await }
        });
        eventually(|| stalling.is_stalled()).await;
        controller.stop().await;

        assert_eq!(start.await.unwrap(), Err(MonitorError::Cancelled));
        assert_eq!(controller.state(), MonitorState::Stopped);
        assert!(stalling.broker.subscribed_topics().is_none());
    }

    #[tokio::test]
    async fn stop_cancels_resubscribe_while_resolving() {
        let stalling = Stalling::default();
        stalling.broker.create_topic("a-b-c-topic");
        let controller = stalling_controller(&stalling);
        controller.start().await.unwrap();

        stalling.stall_list.store(true, Ordering::SeqCst);
        let resubscribe = tokio::spawn({
            let controller = controller.clone();
            async move { controller.resubscribe().await }
        });
        eventually(|| stalling.is_stalled()).await;
        controller.stop().await;

        assert_eq!(resubscribe.await.unwrap(), Err(MonitorError::Cancelled));
        assert_eq!(controller.state(), MonitorState::Stopped);
        assert!(stalling.broker.subscribed_topics().is_none());
    }

    #[tokio::test]
    async fn stop_cancels_resubscribe_while_subscribing() {
        let stalling = Stalling::default();
        stalling.broker.create_topic("a-b-c-topic");
        let controller = stalling_controller(&stalling);
        controller.start().await.unwrap();

        stalling.stall_subscribe.store(true, Ordering::SeqCst);
        let resubscribe = tokio::spawn({
            let controller = controller.clone();
            async move { controller.resubscribe().await }
        });
        eventually(|| stalling.is_stalled()).await;
        controller.stop().await;

        assert_eq!(resubscribe.await.unwrap(), Err(MonitorError::Cancelled));
        assert_eq!(controller.state(), MonitorState::Stopped);
        assert!(controller.topics().is_empty());
        assert!(stalling.broker.subscribed_topics().is_none());
    }

    #[tokio::test]
    async fn non_fatal_transport_error_stays_active() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let (controller, sink) = controller(&broker);
        controller.start().await.unwrap();

        broker
            .inject(TransportEvent::Error {
                message: "broker transport failure".into(),
                fatal: false,
            })
            .await;

        eventually(|| sink.errors.lock().len() == 1).await;
        assert_eq!(controller.state(), MonitorState::Active);
    }

    #[tokio::test]
    async fn shutdown_closes_transport() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let (controller, _) = controller(&broker);
        controller.start().await.unwrap();

        controller.shutdown().await.unwrap();

        assert!(broker.is_closed());
        assert_eq!(controller.state(), MonitorState::Stopped);
    }
}
