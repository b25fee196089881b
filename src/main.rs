use anyhow::Result;
use clap::Parser;

use flowwatch::commands;
use flowwatch::{Cli, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.apply(&cli.overrides());
    init_logging(&settings, cli.log_level.is_some());

    commands::dispatch(cli.command, settings).await
}

/// Install the tracing subscriber. `RUST_LOG` wins unless `--log-level` was given.
fn init_logging(settings: &Settings, explicit: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if explicit {
        EnvFilter::new(&settings.logging.level)
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
