//! In-process broker for tests, demos and harnesses.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use flowwatch_types::FlowId;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    Publisher, RawRecord, TopicDirectory, Transport, TransportEvent, TransportEvents,
    DEFAULT_EVENT_BUFFER,
};
use crate::MonitorError;

/// An in-memory broker implementing every transport trait.
///
/// Messages published to a topic are delivered to the current subscription
/// if it covers that topic; nothing is retained for later subscribers.
/// Cloning yields another handle to the same broker.
///
/// # Example
///
/// ```rust
/// use flowwatch_monitor::MemoryBroker;
///
/// let broker = MemoryBroker::new();
/// broker.create_topic("acme-alice-ingest-topic");
/// broker.create_topic("audit-log");
///
/// assert_eq!(broker.topics().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<BrokerState>>,
}

#[derive(Debug)]
struct BrokerState {
    topics: Vec<String>,
    offsets: HashMap<String, i64>,
    directory_available: bool,
    subscribe_failure: Option<String>,
    subscription: Option<Subscription>,
    closed: bool,
    buffer: usize,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            offsets: HashMap::new(),
            directory_available: true,
            subscribe_failure: None,
            subscription: None,
            closed: false,
            buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

#[derive(Debug)]
struct Subscription {
    topics: BTreeSet<String>,
    sender: mpsc::Sender<TransportEvent>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broker whose subscription streams buffer `buffer` events.
    pub fn with_buffer(buffer: usize) -> Self {
        let broker = Self::new();
        broker.inner.lock().buffer = buffer.max(1);
        broker
    }

    /// Create a topic. Returns `false` if it already existed.
    pub fn create_topic(&self, name: impl Into<String>) -> bool {
        let name = name.into();
        let mut state = self.inner.lock();
        if state.topics.contains(&name) {
            return false;
        }
        state.topics.push(name);
        true
    }

    /// Delete a topic. Returns `false` if it did not exist.
    pub fn delete_topic(&self, name: &str) -> bool {
        let mut state = self.inner.lock();
        let before = state.topics.len();
        state.topics.retain(|t| t != name);
        state.offsets.remove(name);
        state.topics.len() != before
    }

    /// All topics, in creation order.
    pub fn topics(&self) -> Vec<String> {
        self.inner.lock().topics.clone()
    }

    /// Simulate a directory outage (or recovery).
    pub fn set_directory_available(&self, available: bool) {
        self.inner.lock().directory_available = available;
    }

    /// Make subsequent `subscribe` calls fail with `message` (or succeed again).
    pub fn set_subscribe_failure(&self, message: Option<String>) {
        self.inner.lock().subscribe_failure = message;
    }

    /// Topics of the live subscription, if any.
    pub fn subscribed_topics(&self) -> Option<BTreeSet<String>> {
        self.inner
            .lock()
            .subscription
            .as_ref()
            .map(|s| s.topics.clone())
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Publish a message to an existing topic.
    ///
    /// Returns `false` if the topic does not exist or the broker is closed.
    pub async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: impl Into<Vec<u8>>,
    ) -> bool {
        let (record, sender) = {
            let mut state = self.inner.lock();
            if state.closed || !state.topics.iter().any(|t| t == topic) {
                return false;
            }
            let offset = state.offsets.entry(topic.to_string()).or_insert(0);
            let record = RawRecord {
                topic: topic.to_string(),
                partition: 0,
                offset: *offset,
                key: key.map(|k| k.as_bytes().to_vec()),
                payload: payload.into(),
                timestamp_ms: Some(flowwatch_types::current_timestamp_ms() as i64),
            };
            *offset += 1;

            let sender = state
                .subscription
                .as_ref()
                .filter(|s| s.topics.contains(topic))
                .map(|s| s.sender.clone());
            (record, sender)
        };

        if let Some(sender) = sender {
            // A closed stream means the subscription ended meanwhile
            let _ = sender.send(TransportEvent::Record(record)).await;
        }
        true
    }

    /// Push an arbitrary event into the live subscription.
    ///
    /// Returns `false` if nothing is subscribed.
    pub async fn inject(&self, event: TransportEvent) -> bool {
        let sender = self
            .inner
            .lock()
            .subscription
            .as_ref()
            .map(|s| s.sender.clone());
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl TopicDirectory for MemoryBroker {
    async fn list_topics(&self) -> Result<Vec<String>, MonitorError> {
        let state = self.inner.lock();
        if !state.directory_available {
            return Err(MonitorError::DirectoryUnavailable(
                "memory broker directory is offline".to_string(),
            ));
        }
        Ok(state.topics.clone())
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn subscribe(&self, topics: &BTreeSet<String>) -> Result<TransportEvents, MonitorError> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(MonitorError::Transport {
                message: "memory broker is closed".to_string(),
                fatal: true,
            });
        }
        if let Some(message) = &state.subscribe_failure {
            return Err(MonitorError::transport(message.clone()));
        }

        let (sender, receiver) = mpsc::channel(state.buffer);
        // Fresh channel, so there is room for the first event
        let _ = sender.try_send(TransportEvent::Connected);
        state.subscription = Some(Subscription {
            topics: topics.clone(),
            sender,
        });
        Ok(receiver)
    }

    async fn unsubscribe(&self) -> Result<(), MonitorError> {
        self.inner.lock().subscription = None;
        Ok(())
    }

    async fn close(&self) -> Result<(), MonitorError> {
        let mut state = self.inner.lock();
        state.subscription = None;
        state.closed = true;
        Ok(())
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn send(&self, flow_id: &FlowId, payload: &[u8], key: Option<&str>) -> bool {
        self.publish(&flow_id.topic_name(), key, payload.to_vec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic_set(topics: &[&str]) -> BTreeSet<String> {
        topics.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn create_topic_is_idempotent() {
        let broker = MemoryBroker::new();
        assert!(broker.create_topic("a-b-c-topic"));
        assert!(!broker.create_topic("a-b-c-topic"));
        assert_eq!(broker.topics(), vec!["a-b-c-topic"]);
    }

    #[tokio::test]
    async fn directory_outage_is_reported() {
        let broker = MemoryBroker::new();
        broker.set_directory_available(false);
        assert!(matches!(
            broker.list_topics().await,
            Err(MonitorError::DirectoryUnavailable(_))
        ));

        broker.set_directory_available(true);
        assert!(broker.list_topics().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscription_receives_only_its_topics() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        broker.create_topic("d-e-f-topic");

        let mut events = broker.subscribe(&topic_set(&["a-b-c-topic"])).await.unwrap();
        assert_eq!(events.recv().await, Some(TransportEvent::Connected));

        assert!(broker.publish("d-e-f-topic", None, "ignored").await);
        assert!(broker.publish("a-b-c-topic", Some("k"), "kept").await);

        match events.recv().await {
            Some(TransportEvent::Record(record)) => {
                assert_eq!(record.topic, "a-b-c-topic");
                assert_eq!(record.key.as_deref(), Some(&b"k"[..]));
                assert_eq!(record.payload, b"kept");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn publish_to_missing_topic_fails() {
        let broker = MemoryBroker::new();
        assert!(!broker.publish("nope-topic", None, "x").await);
    }

    #[tokio::test]
    async fn offsets_increase_per_topic() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let mut events = broker.subscribe(&topic_set(&["a-b-c-topic"])).await.unwrap();
        events.recv().await;

        broker.publish("a-b-c-topic", None, "1").await;
        broker.publish("a-b-c-topic", None, "2").await;

        let mut offsets = Vec::new();
        for _ in 0..2 {
            if let Some(TransportEvent::Record(record)) = events.recv().await {
                offsets.push(record.offset);
            }
        }
        assert_eq!(offsets, vec![0, 1]);
    }

    #[tokio::test]
    async fn unsubscribe_closes_stream_after_buffered_events() {
        let broker = MemoryBroker::new();
        broker.create_topic("a-b-c-topic");
        let mut events = broker.subscribe(&topic_set(&["a-b-c-topic"])).await.unwrap();
        broker.publish("a-b-c-topic", None, "buffered").await;

        broker.unsubscribe().await.unwrap();

        assert_eq!(events.recv().await, Some(TransportEvent::Connected));
        assert!(matches!(events.recv().await, Some(TransportEvent::Record(_))));
        assert_eq!(events.recv().await, None);
        assert!(broker.subscribed_topics().is_none());
    }

    #[tokio::test]
    async fn closed_broker_rejects_subscribe() {
        let broker = MemoryBroker::new();
        broker.close().await.unwrap();
        assert!(broker.is_closed());
        assert!(broker.subscribe(&BTreeSet::new()).await.is_err());
    }

    #[tokio::test]
    async fn publisher_targets_flow_topic() {
        let broker = MemoryBroker::new();
        broker.create_topic("test-user-flow-topic");
        let mut events = broker
            .subscribe(&topic_set(&["test-user-flow-topic"]))
            .await
            .unwrap();
        events.recv().await;

        let flow = FlowId::parse("test-user-flow").unwrap();
        assert!(broker.send(&flow, b"{}", Some("test-key-0")).await);

        assert!(matches!(events.recv().await, Some(TransportEvent::Record(_))));
    }
}
