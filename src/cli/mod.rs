//! CLI interface and argument parsing
//!
//! This module provides the `courier` command line using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Study Courier - imaging study export and delivery
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(version, about, long_about = None)]
#[command(author = "Study Courier Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "courier.toml", env = "COURIER_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "COURIER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the delivery endpoint, change feed, upload watcher and monitor
    Serve(commands::serve::ServeArgs),

    /// Export one study by hand
    Export(commands::export::ExportArgs),

    /// Run the upload watcher
    Watch(commands::watch::WatchArgs),

    /// Show ledger records and queue state
    Status(commands::status::StatusArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

impl Commands {
    /// Whether the command runs as a long-lived service
    pub fn is_service(&self) -> bool {
        match self {
            Commands::Serve(_) => true,
            Commands::Watch(args) => !args.once,
            _ => false,
        }
    }
}
