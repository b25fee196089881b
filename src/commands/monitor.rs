//! The `monitor` command and the watch loop it shares with `demo`.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use flowwatch_monitor::{
    EventKind, FlowId, FlowOutputMonitor, ListenerResult, MonitorEvent, MonitorState,
};
use tracing::{info, warn};

use crate::cli::WatchArgs;
use crate::report::{self, OutputFormat};

/// How the watch loop prints and how often it reports.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub flow: Option<FlowId>,
    pub format: OutputFormat,
    pub report_interval: Duration,
}

impl WatchOptions {
    /// Build options from CLI arguments, falling back to `default_interval`.
    pub fn from_args(args: &WatchArgs, default_interval: Duration) -> Result<Self> {
        let flow = match &args.flow {
            Some(flow) => Some(
                FlowId::parse(flow)
                    .with_context(|| format!("'{}' is not an org-user-node flow id", flow))?,
            ),
            None => None,
        };
        Ok(Self {
            flow,
            format: if args.json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            report_interval: args
                .report_interval
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or(default_interval),
        })
    }
}

/// Print outputs and periodic reports until `shutdown` resolves, then
/// print final statistics and disconnect.
///
/// Each report tick also re-checks the topic set, so flows created while
/// watching are picked up. A monitor that lost its connection is restarted.
pub async fn watch<F>(
    monitor: &FlowOutputMonitor,
    options: &WatchOptions,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    register_printers(monitor, options)?;

    let topics = monitor
        .start_monitoring()
        .await
        .context("failed to start monitoring")?;
    if topics.is_empty() {
        info!("No flow topics yet; waiting for flows to appear");
    }

    let mut ticker = tokio::time::interval(options.report_interval);
    ticker.tick().await;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                keep_current(monitor).await;
                print!(
                    "{}",
                    report::status_report(&monitor.monitoring_status(), &monitor.topic_statistics())
                );
            }
        }
    }

    info!("Shutting down monitor");
    print!(
        "{}",
        report::final_report(&monitor.monitoring_status(), &monitor.topic_statistics())
    );
    monitor.disconnect().await.context("failed to disconnect")?;
    Ok(())
}

async fn keep_current(monitor: &FlowOutputMonitor) {
    let result = match monitor.state() {
        MonitorState::Idle => monitor.start_monitoring().await.map(|_| ()),
        _ => monitor.refresh().await.map(|_| ()),
    };
    if let Err(e) = result {
        warn!(error = %e, "Topic re-check failed");
    }
}

fn register_printers(monitor: &FlowOutputMonitor, options: &WatchOptions) -> Result<()> {
    let format = options.format;
    let print_output = move |event: &MonitorEvent| -> ListenerResult {
        if let Some(record) = event.as_output() {
            println!("{}", report::output_line(record, format));
        }
        Ok(())
    };
    match &options.flow {
        Some(flow) => monitor.on_flow(flow.as_str(), print_output)?,
        None => monitor.on(EventKind::FlowOutput, print_output)?,
    };

    monitor.on(EventKind::MonitoringStarted, |event| {
        if let MonitorEvent::MonitoringStarted { topics } = event {
            info!(count = topics.len(), topics = ?topics, "Monitoring flow topics");
        }
        Ok(())
    })?;
    monitor.on(EventKind::MonitorConnected, |_| {
        info!("Connected to broker");
        Ok(())
    })?;
    monitor.on(EventKind::MonitorError, |event| {
        if let Some(error) = event.as_error() {
            warn!(error = %error, "Monitor error");
        }
        Ok(())
    })?;
    Ok(())
}

/// Monitor every flow topic on the configured Kafka cluster until Ctrl-C.
#[cfg(feature = "kafka")]
pub async fn run(settings: &crate::settings::Settings, args: &WatchArgs) -> Result<()> {
    use flowwatch_adapters::kafka::{KafkaTopicDirectory, KafkaTransport};

    let mut kafka = settings.kafka.clone();
    if args.from_beginning {
        kafka.auto_offset_reset = "earliest".to_string();
    }
    let options = WatchOptions::from_args(args, settings.report_interval())?;

    info!(brokers = %kafka.bootstrap_servers(), group = %kafka.group_id, "Connecting to Kafka");
    let monitor = FlowOutputMonitor::builder()
        .config(settings.monitor_config())
        .directory(KafkaTopicDirectory::new(&kafka).context("failed to create Kafka directory")?)
        .transport(KafkaTransport::new(&kafka).context("failed to create Kafka consumer")?)
        .build()?;

    watch(&monitor, &options, ctrl_c()).await
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
