use std::time::Duration;

use async_trait::async_trait;
use flowwatch_monitor::{FlowId, Publisher};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{debug, warn};

use crate::{AdapterError, KafkaSettings};

/// Sends payloads to flow topics.
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaPublisher {
    /// Create the producer. Does not contact the brokers.
    pub fn new(settings: &KafkaSettings) -> Result<Self, AdapterError> {
        settings.validate()?;
        let producer: FutureProducer = settings.client_config().create()?;
        Ok(Self {
            producer,
            timeout: settings.timeout(),
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn send(&self, flow_id: &FlowId, payload: &[u8], key: Option<&str>) -> bool {
        let topic = flow_id.topic_name();
        let mut record = FutureRecord::<str, [u8]>::to(&topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        match self.producer.send(record, self.timeout).await {
            Ok(_) => {
                debug!(topic = %topic, "Delivered payload");
                true
            }
            Err((e, _)) => {
                warn!(topic = %topic, error = %e, "Failed to deliver payload");
                false
            }
        }
    }
}

impl std::fmt::Debug for KafkaPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaPublisher")
            .field("timeout", &self.timeout)
            .finish()
    }
}
