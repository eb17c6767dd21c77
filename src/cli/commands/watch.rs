//! Watch command implementation
//!
//! Runs the upload watcher on its own, without the delivery endpoint or
//! the change feed.

use super::process_runner;
use crate::adapters::command::FileSenderUploader;
use crate::config::load_config;
use crate::core::ledger::MappingLedger;
use crate::core::watcher::UploadWatcher;
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the watch command
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

impl WatchArgs {
    /// Execute the watch command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };

        let ledger = Arc::new(MappingLedger::new(config.export.ledger_path()));
        let uploader = FileSenderUploader::new(config.uploader.clone(), process_runner());
        let mut watcher = UploadWatcher::from_config(&config, ledger, uploader);

        if !self.once {
            watcher.run(shutdown_signal).await;
            return Ok(0);
        }

        let report = match watcher.run_cycle().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Watcher cycle failed");
                eprintln!("Watcher cycle failed: {e}");
                return Ok(5);
            }
        };

        println!("📬 Upload Cycle:");
        println!("  Scanned: {}", report.scanned);
        println!("  Uploaded: {}", report.uploaded);
        println!("  Failed: {}", report.failed);
        println!("  Skipped: {}", report.skipped);
        println!("  Without recipients: {}", report.unmapped);
        println!("  Ledger records pruned: {}", report.pruned);
        println!();

        if report.failed > 0 {
            println!("⚠️  Some uploads failed; they will be retried on the next cycle");
            Ok(1)
        } else {
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_config_is_config_error() {
        let args = WatchArgs { once: true };
        let (_tx, rx) = watch::channel(false);
        assert_eq!(args.execute("/nonexistent/courier.toml", rx).await.unwrap(), 2);
    }
}
