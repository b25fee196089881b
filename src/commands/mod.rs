//! Subcommand implementations.

pub mod demo;
pub mod monitor;
pub mod send;

#[cfg(feature = "kafka")]
pub mod create_topic;
#[cfg(feature = "kafka")]
pub mod topics;

use anyhow::Result;

use crate::cli::Command;
use crate::settings::Settings;

/// Run a parsed subcommand to completion.
pub async fn dispatch(command: Command, settings: Settings) -> Result<()> {
    match command {
        Command::Demo(args) => demo::run(&settings, &args).await,
        #[cfg(feature = "kafka")]
        Command::Monitor(args) => monitor::run(&settings, &args).await,
        #[cfg(feature = "kafka")]
        Command::Topics => topics::run(&settings).await,
        #[cfg(feature = "kafka")]
        Command::Send(args) => send::run(&settings, &args).await,
        #[cfg(feature = "kafka")]
        Command::CreateTopic(args) => create_topic::run(&settings, &args).await,
        #[cfg(not(feature = "kafka"))]
        _ => anyhow::bail!(
            "this build of flowwatch has no Kafka support; only `demo` is available"
        ),
    }
}
