//! # flowwatch
//!
//! Command-line front end for the flowwatch flow output monitor.
//!
//! ```text
//! ┌───────────┐   ┌───────────────────┐   ┌────────────────────┐
//! │  cli      │──▶│ settings          │──▶│ commands           │
//! │ (clap)    │   │ (file, env, flags)│   │ monitor / demo ... │
//! └───────────┘   └───────────────────┘   └─────────┬──────────┘
//!                                                   │
//!                                  ┌────────────────┴──────────────┐
//!                                  ▼                               ▼
//!                      flowwatch-adapters (Kafka)     MemoryBroker (demo)
//!                                  └──────────▶ flowwatch-monitor ◀┘
//! ```
//!
//! - **[`cli`]**: argument parsing
//! - **[`settings`]**: layered configuration through the `config` crate
//! - **[`report`]**: console rendering of outputs and status snapshots
//! - **[`commands`]**: one module per subcommand
//!
//! ## Usage
//!
//! ```bash
//! # Watch every flow topic, printing a status report every 30 seconds
//! flowwatch --brokers kafka-1:9092 monitor
//!
//! # Only one flow, as JSON lines
//! flowwatch monitor --flow acme-alice-ingest --json
//!
//! # Send sample messages to a flow's topic
//! flowwatch send --flow test-user-flow
//!
//! # Try it without Kafka
//! flowwatch demo
//! ```

pub mod cli;
pub mod commands;
pub mod report;
pub mod settings;

pub use cli::{Cli, Command};
pub use settings::{Overrides, Settings};
