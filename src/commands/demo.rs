//! The `demo` command: the full monitor against an in-memory broker.

use std::time::Duration;

use anyhow::Result;
use flowwatch_monitor::{FlowId, FlowOutputMonitor, MemoryBroker, Publisher};
use serde_json::json;
use tracing::info;

use super::monitor::{ctrl_c, watch, WatchOptions};
use crate::cli::DemoArgs;
use crate::settings::Settings;

/// Flows that exist when the demo starts.
pub const INITIAL_FLOWS: [&str; 2] = ["acme-alice-ingest", "acme-bob-enrich"];
/// Flow whose topic appears halfway through, to exercise re-subscription.
pub const LATE_FLOW: &str = "globex-carol-export";
/// A topic that does not follow the flow convention and is never monitored.
pub const NOISE_TOPIC: &str = "audit-log";

/// Generate traffic into `broker` for `count` messages, creating the late
/// flow's topic halfway through.
pub async fn generate_traffic(broker: MemoryBroker, count: usize, interval: Duration) {
    let mut flows: Vec<FlowId> = INITIAL_FLOWS.iter().filter_map(|f| FlowId::parse(f)).collect();
    let late = FlowId::parse(LATE_FLOW);
    if flows.is_empty() {
        return;
    }

    for n in 0..count {
        if n == count / 2 {
            if let Some(late) = &late {
                broker.create_topic(late.topic_name());
                info!(topic = %late.topic_name(), "Demo created a new flow topic");
                flows.push(late.clone());
            }
        }

        let flow = &flows[n % flows.len()];
        let payload = json!({ "flow": flow.as_str(), "n": n, "node": flow.node() }).to_string();
        broker.send(flow, payload.as_bytes(), Some(&format!("demo-{}", n))).await;
        broker.publish(NOISE_TOPIC, None, format!("noise {}", n)).await;

        tokio::time::sleep(interval).await;
    }
}

/// Run the demo until the generated traffic is done (or Ctrl-C).
pub async fn run(settings: &Settings, args: &DemoArgs) -> Result<()> {
    let options = WatchOptions::from_args(&args.watch, Duration::from_secs(2))?;
    run_with(settings, args, options).await
}

async fn run_with(settings: &Settings, args: &DemoArgs, options: WatchOptions) -> Result<()> {
    let broker = MemoryBroker::new();
    for flow in INITIAL_FLOWS {
        broker.create_topic(format!("{}-topic", flow));
    }
    broker.create_topic(NOISE_TOPIC);

    let monitor = FlowOutputMonitor::builder()
        .config(settings.monitor_config())
        .directory(broker.clone())
        .transport(broker.clone())
        .build()?;

    let interval = Duration::from_millis(args.interval_ms);
    let traffic = tokio::spawn(generate_traffic(broker.clone(), args.count, interval));
    // Leave one report interval after the last message so the late flow is reported
    let settle = options.report_interval + interval;
    let done = async move {
        let _ = traffic.await;
        tokio::time::sleep(settle).await;
    };

    let shutdown = async {
        tokio::select! {
            _ = done => {}
            _ = ctrl_c() => {}
        }
    };
    watch(&monitor, &options, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::OutputFormat;

    #[tokio::test]
    async fn traffic_reaches_all_flow_topics() {
        let broker = MemoryBroker::new();
        for flow in INITIAL_FLOWS {
            broker.create_topic(format!("{}-topic", flow));
        }

        generate_traffic(broker.clone(), 4, Duration::from_millis(1)).await;

        let topics = broker.topics();
        assert!(topics.contains(&"globex-carol-export-topic".to_string()));
        assert!(!topics.contains(&NOISE_TOPIC.to_string()));
    }

    #[tokio::test]
    async fn demo_runs_to_completion() {
        let args = DemoArgs {
            watch: Default::default(),
            count: 6,
            interval_ms: 5,
        };
        let options = WatchOptions {
            flow: None,
            format: OutputFormat::Json,
            report_interval: Duration::from_millis(20),
        };

        run_with(&Settings::default(), &args, options).await.unwrap();
    }
}
