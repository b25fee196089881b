//! The `topics` command: connection check and topic listing.

use anyhow::{Context, Result};
use flowwatch_adapters::kafka::KafkaTopicDirectory;
use flowwatch_monitor::match_topic;
use tracing::info;

use crate::settings::Settings;

/// List every topic on the cluster, then the flow topics among them.
pub async fn run(settings: &Settings) -> Result<()> {
    info!(brokers = %settings.kafka.bootstrap_servers(), "Connecting to Kafka");
    let directory =
        KafkaTopicDirectory::new(&settings.kafka).context("failed to create Kafka client")?;
    let mut topics = directory
        .topics()
        .await
        .context("failed to fetch cluster metadata")?;
    topics.sort();

    println!("Connected to {}", settings.kafka.bootstrap_servers());
    println!("{} topics", topics.len());
    for topic in &topics {
        println!("  {}", topic);
    }

    let flows: Vec<_> = topics
        .iter()
        .filter_map(|t| match_topic(t).map(|flow| (t, flow)))
        .collect();
    println!("{} flow topics", flows.len());
    for (topic, flow) in flows {
        println!("  {} -> {}", topic, flow);
    }
    Ok(())
}
