//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::settings::Overrides;

#[derive(Parser, Debug)]
#[command(name = "flowwatch")]
#[command(about = "Live monitor for the output topics of stream-processing flows")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML, YAML or JSON config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Kafka brokers, comma-separated (e.g. "kafka-1:9092,kafka-2:9092")
    #[arg(short, long, global = true)]
    pub brokers: Option<String>,

    /// Kafka client id
    #[arg(long, global = true)]
    pub client_id: Option<String>,

    /// Kafka consumer group id
    #[arg(long, global = true)]
    pub group_id: Option<String>,

    /// Number of recent outputs kept in memory
    #[arg(long, global = true)]
    pub capacity: Option<usize>,

    /// Log filter (e.g. "debug", "flowwatch_monitor=trace"); overrides RUST_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// The settings overrides carried by the global flags.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            brokers: self.brokers.clone(),
            client_id: self.client_id.clone(),
            group_id: self.group_id.clone(),
            capacity: self.capacity,
            log_level: self.log_level.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch every flow output topic until Ctrl-C
    Monitor(WatchArgs),

    /// Check the connection and list topics
    Topics,

    /// Publish to a flow's topic
    Send(SendArgs),

    /// Create a flow's topic
    CreateTopic(CreateTopicArgs),

    /// Run the monitor against an in-memory broker with generated traffic
    Demo(DemoArgs),
}

/// Options shared by `monitor` and `demo`.
#[derive(Args, Debug, Clone, Default)]
pub struct WatchArgs {
    /// Only print outputs of this flow (org-user-node)
    #[arg(short, long)]
    pub flow: Option<String>,

    /// Print outputs as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Seconds between status reports (and topic re-checks)
    #[arg(short, long)]
    pub report_interval: Option<u64>,

    /// Also read messages produced before this consumer group first joined
    #[arg(long)]
    pub from_beginning: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    /// Target flow (org-user-node)
    #[arg(short, long)]
    pub flow: String,

    /// Message key
    #[arg(short, long)]
    pub key: Option<String>,

    /// Payload to send; without it three sample messages are sent
    pub payload: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CreateTopicArgs {
    /// Flow whose topic to create (org-user-node)
    #[arg(short, long)]
    pub flow: String,

    /// Number of partitions
    #[arg(long, default_value = "1")]
    pub partitions: i32,

    /// Replication factor
    #[arg(long, default_value = "1")]
    pub replication: i32,
}

#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    #[command(flatten)]
    pub watch: WatchArgs,

    /// Messages to generate before shutting down
    #[arg(short = 'n', long, default_value = "12")]
    pub count: usize,

    /// Milliseconds between generated messages
    #[arg(long, default_value = "500")]
    pub interval_ms: u64,
}
