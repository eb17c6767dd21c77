//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the courier configuration file.

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as part of loading
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Host Server: {}", config.host.base_url);
        println!(
            "  Host Credentials: {}",
            if config.host.password.is_some() {
                "configured"
            } else {
                "none"
            }
        );
        println!("  Export Area: {}", config.export.export_dir.display());
        println!("  Ledger: {}", config.export.ledger_path().display());
        println!("  Delivery Queue: {}", config.queue.queue_dir.display());
        println!("  Artifact Extension: {}", config.queue.artifact_extension);
        println!("  Delete Originals: {}", config.export.delete_original);
        println!("  Delivery Endpoint: {}", config.export.delivery_endpoint);
        println!("  Bind Address: {}", config.server.bind_address);
        println!(
            "  Uploader: {} {}",
            config.uploader.program,
            config.uploader.args.join(" ")
        );
        println!(
            "  Uploader Account: {}",
            config.uploader.username.as_deref().unwrap_or("(none)")
        );
        println!(
            "  Health Monitor: {}",
            if config.monitor.enabled {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!();
        Ok(0)
    }
}
