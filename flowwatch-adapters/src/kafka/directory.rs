use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowwatch_monitor::{FlowId, MonitorError, TopicDirectory};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::RDKafkaErrorCode;
use tracing::{debug, info};

use crate::{AdapterError, KafkaSettings};

/// Topic listing and flow topic creation.
pub struct KafkaTopicDirectory {
    consumer: Arc<BaseConsumer>,
    admin: AdminClient<DefaultClientContext>,
    timeout: Duration,
}

impl KafkaTopicDirectory {
    /// Create metadata and admin clients. Does not contact the brokers.
    pub fn new(settings: &KafkaSettings) -> Result<Self, AdapterError> {
        settings.validate()?;
        let consumer: BaseConsumer = settings.client_config().create()?;
        let admin: AdminClient<DefaultClientContext> = settings.client_config().create()?;
        Ok(Self {
            consumer: Arc::new(consumer),
            admin,
            timeout: settings.timeout(),
        })
    }

    /// Every topic in the cluster metadata.
    pub async fn topics(&self) -> Result<Vec<String>, AdapterError> {
        let consumer = self.consumer.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || -> Result<Vec<String>, AdapterError> {
            let metadata = consumer.fetch_metadata(None, timeout)?;
            Ok(metadata
                .topics()
                .iter()
                .map(|t| t.name().to_string())
                .collect())
        })
        .await
        .map_err(|e| AdapterError::Connection(format!("metadata task failed: {}", e)))?
    }

    /// Create the topic of `flow`.
    ///
    /// Returns `false` if the topic already existed.
    pub async fn create_flow_topic(
        &self,
        flow: &FlowId,
        partitions: i32,
        replication: i32,
    ) -> Result<bool, AdapterError> {
        let name = flow.topic_name();
        let topic = NewTopic::new(&name, partitions, TopicReplication::Fixed(replication));
        let options = AdminOptions::new().operation_timeout(Some(self.timeout));

        let results = self.admin.create_topics([&topic], &options).await?;
        match results.into_iter().next() {
            Some(Ok(_)) => {
                info!(topic = %name, partitions, replication, "Created flow topic");
                Ok(true)
            }
            Some(Err((_, RDKafkaErrorCode::TopicAlreadyExists))) => {
                debug!(topic = %name, "Flow topic already exists");
                Ok(false)
            }
            Some(Err((_, code))) => Err(AdapterError::Broker(format!(
                "creating '{}' failed: {}",
                name, code
            ))),
            None => Err(AdapterError::Broker(format!(
                "no result for topic '{}'",
                name
            ))),
        }
    }
}

#[async_trait]
impl TopicDirectory for KafkaTopicDirectory {
    async fn list_topics(&self) -> Result<Vec<String>, MonitorError> {
        self.topics()
            .await
            .map_err(|e| MonitorError::DirectoryUnavailable(e.to_string()))
    }
}

impl std::fmt::Debug for KafkaTopicDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaTopicDirectory")
            .field("timeout", &self.timeout)
            .finish()
    }
}
