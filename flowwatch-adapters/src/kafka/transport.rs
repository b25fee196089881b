use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use flowwatch_monitor::{MonitorError, RawRecord, Transport, TransportEvent, TransportEvents};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::Message;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::is_fatal;
use crate::{AdapterError, KafkaSettings};

struct ActiveSubscription {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// The shared monitoring consumer.
///
/// Each subscription runs a receive task that forwards records into the
/// event stream until it is stopped or librdkafka reports a fatal error.
pub struct KafkaTransport {
    consumer: Arc<StreamConsumer>,
    buffer: usize,
    active: Mutex<Option<ActiveSubscription>>,
    closed: AtomicBool,
}

impl KafkaTransport {
    /// Create the consumer. Does not contact the brokers.
    pub fn new(settings: &KafkaSettings) -> Result<Self, AdapterError> {
        settings.validate()?;
        let consumer: StreamConsumer = settings.consumer_config().create()?;
        Ok(Self {
            consumer: Arc::new(consumer),
            buffer: settings.buffer,
            active: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    async fn stop_active(&self) -> Result<(), MonitorError> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(());
        };
        let _ = active.stop_tx.send(true);
        if let Err(e) = active.task.await {
            warn!(error = %e, "Kafka receive task terminated abnormally");
        }
        self.consumer.unsubscribe();
        debug!("Kafka consumer unsubscribed");
        Ok(())
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    async fn subscribe(&self, topics: &BTreeSet<String>) -> Result<TransportEvents, MonitorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MonitorError::Transport {
                message: "Kafka transport is closed".to_string(),
                fatal: true,
            });
        }
        self.stop_active().await?;

        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer
            .subscribe(&names)
            .map_err(|e| MonitorError::from(AdapterError::from(e)))?;
        info!(topics = names.len(), "Kafka consumer subscribed");

        let (events_tx, events_rx) = mpsc::channel(self.buffer);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(receive(self.consumer.clone(), events_tx, stop_rx));

        *self.active.lock().await = Some(ActiveSubscription { stop_tx, task });
        Ok(events_rx)
    }

    async fn unsubscribe(&self) -> Result<(), MonitorError> {
        self.stop_active().await
    }

    async fn close(&self) -> Result<(), MonitorError> {
        self.closed.store(true, Ordering::SeqCst);
        self.stop_active().await
    }
}

impl std::fmt::Debug for KafkaTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaTransport")
            .field("buffer", &self.buffer)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

async fn receive(
    consumer: Arc<StreamConsumer>,
    events: mpsc::Sender<TransportEvent>,
    mut stop_rx: watch::Receiver<bool>,
) {
    if events.send(TransportEvent::Connected).await.is_err() {
        return;
    }

    loop {
        let event = tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            message = consumer.recv() => translate(message),
        };

        let fatal = matches!(event, TransportEvent::Error { fatal: true, .. });
        if events.send(event).await.is_err() || fatal {
            break;
        }
    }
}

fn translate<M: Message>(result: KafkaResult<M>) -> TransportEvent {
    match result {
        Ok(message) => TransportEvent::Record(raw_record(&message)),
        Err(e) => TransportEvent::Error {
            fatal: is_fatal(&e),
            message: e.to_string(),
        },
    }
}

fn raw_record<M: Message>(message: &M) -> RawRecord {
    RawRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(<[u8]>::to_vec),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        timestamp_ms: message.timestamp().to_millis(),
    }
}
