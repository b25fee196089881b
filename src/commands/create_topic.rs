//! The `create-topic` command.

use anyhow::{Context, Result};
use flowwatch_adapters::kafka::KafkaTopicDirectory;
use flowwatch_monitor::FlowId;

use crate::cli::CreateTopicArgs;
use crate::settings::Settings;

/// Create a flow's topic through the admin API.
pub async fn run(settings: &Settings, args: &CreateTopicArgs) -> Result<()> {
    let flow = FlowId::parse(&args.flow)
        .with_context(|| format!("'{}' is not an org-user-node flow id", args.flow))?;
    let directory =
        KafkaTopicDirectory::new(&settings.kafka).context("failed to create Kafka client")?;

    let created = directory
        .create_flow_topic(&flow, args.partitions, args.replication)
        .await
        .with_context(|| format!("failed to create {}", flow.topic_name()))?;

    if created {
        println!("Created {}", flow.topic_name());
    } else {
        println!("{} already exists", flow.topic_name());
    }
    Ok(())
}
