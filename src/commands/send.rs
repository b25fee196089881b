//! The `send` command.

use anyhow::{Context, Result};
use flowwatch_monitor::{FlowId, Publisher};
use flowwatch_types::current_timestamp_ms;
use serde_json::{json, Value};
use tracing::info;

use crate::cli::SendArgs;

/// The messages sent when no payload is given.
pub fn sample_payloads() -> Vec<Value> {
    vec![
        json!({ "message": "Hello from the flow!", "timestamp_ms": current_timestamp_ms() }),
        json!({ "message": "Processing data...", "data": { "id": 1, "value": "test" } }),
        json!({ "message": "Flow completed successfully", "status": "success" }),
    ]
}

/// Publish each payload in order, keyed `key` or `test-key-<n>`.
///
/// Returns the number of payloads delivered.
pub async fn publish_all(
    publisher: &dyn Publisher,
    flow: &FlowId,
    payloads: &[Vec<u8>],
    key: Option<&str>,
) -> usize {
    let mut delivered = 0;
    for (n, payload) in payloads.iter().enumerate() {
        let key = key
            .map(str::to_string)
            .unwrap_or_else(|| format!("test-key-{}", n));
        if publisher.send(flow, payload, Some(&key)).await {
            delivered += 1;
        }
    }
    delivered
}

/// Turn the CLI arguments into the flow and the payloads to send.
pub fn prepare(args: &SendArgs) -> Result<(FlowId, Vec<Vec<u8>>)> {
    let flow = FlowId::parse(&args.flow)
        .with_context(|| format!("'{}' is not an org-user-node flow id", args.flow))?;
    let payloads = match &args.payload {
        Some(payload) => vec![payload.clone().into_bytes()],
        None => sample_payloads()
            .iter()
            .map(serde_json::to_vec)
            .collect::<Result<_, _>>()?,
    };
    Ok((flow, payloads))
}

/// Publish to a flow's topic on the configured Kafka cluster.
#[cfg(feature = "kafka")]
pub async fn run(settings: &crate::settings::Settings, args: &SendArgs) -> Result<()> {
    use flowwatch_adapters::kafka::KafkaPublisher;

    let (flow, payloads) = prepare(args)?;
    let publisher =
        KafkaPublisher::new(&settings.kafka).context("failed to create Kafka producer")?;

    info!(topic = %flow.topic_name(), messages = payloads.len(), "Publishing");
    let delivered = publish_all(&publisher, &flow, &payloads, args.key.as_deref()).await;
    println!("Delivered {}/{} messages to {}", delivered, payloads.len(), flow.topic_name());

    if delivered < payloads.len() {
        anyhow::bail!("{} messages were not delivered", payloads.len() - delivered);
    }
    Ok(())
}
