//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "courier.toml")]
    pub output: String,

    /// Include every setting with comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing courier configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your settings", self.output);
                println!("  2. Set COURIER_HOST_PASSWORD and COURIER_UPLOADER_API_KEY");
                println!("     in the environment or a .env file");
                println!("  3. Validate configuration: courier validate-config");
                println!("  4. Start the service: courier serve");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# Study Courier configuration

[host]
base_url = "http://orthanc:8042"
username = "orthanc"

[export]
export_dir = "/exports"

[queue]
queue_dir = "/mailqueue"

[uploader]
args = ["/filesender_cli/filesender.py"]
"#
        .to_string()
    }

    /// Generate configuration with every setting and its default
    fn generate_config_with_examples() -> String {
        r#"# Study Courier configuration
#
# Values of the form ${VAR} are read from the environment. Any setting can
# also be overridden with COURIER_<SECTION>_<KEY>, e.g. COURIER_HOST_BASE_URL.

[application]
# trace | debug | info | warn | error
log_level = "info"

[host]
# REST API of the imaging server
base_url = "http://orthanc:8042"
username = "orthanc"
# password = "${COURIER_HOST_PASSWORD}"
timeout_seconds = 30
tls_verify = true

# Change feed polling
change_poll_interval_seconds = 5
change_batch_size = 100

# Wait between the description rewrite and the archive download
settle_delay_ms = 1000
visibility_poll_attempts = 5

[host.retry]
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

[export]
# Published artifacts and the recipient ledger live here
export_dir = "/exports"
ledger_file = "mapping.json"

# Used when the study description carries no pw= token
default_passphrase = "default123"

# Remove the original study once its artifact is recorded
delete_original = true

# Delivery endpoint called once per recipient
delivery_endpoint = "http://127.0.0.1:8043/send"
delivery_pacing_ms = 500
delivery_timeout_seconds = 30

# 7-Zip compatible executable
compressor_program = "7z"

[export.delivery_retry]
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

[queue]
queue_dir = "/mailqueue"
artifact_extension = "zip"

[server]
bind_address = "127.0.0.1:8043"

[uploader]
program = "python3"
args = ["/filesender_cli/filesender.py"]
# username = "sender@example.org"
# api_key = "${COURIER_UPLOADER_API_KEY}"
timeout_seconds = 300
poll_interval_seconds = 10

[monitor]
enabled = true
interval_seconds = 120
health_attempts = 3
health_retry_delay_seconds = 5
# Defaults to the uploader username
# admin_recipient = "admin@example.org"
state_dir = "/logs/watcher"

[logging]
local_enabled = true
local_path = "/logs/courier"
# daily | hourly
local_rotation = "daily"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use tempfile::TempDir;

    #[test]
    fn test_init_args_defaults() {
        let args = InitArgs {
            output: "courier.toml".to_string(),
            with_examples: false,
            force: false,
        };

        assert_eq!(args.output, "courier.toml");
        assert!(!args.with_examples);
        assert!(!args.force);
    }

    #[test]
    fn test_generated_configs_are_valid() {
        let minimal = parse_config(&InitArgs::generate_minimal_config()).unwrap();
        assert_eq!(minimal.host.base_url, "http://orthanc:8042");

        let full = parse_config(&InitArgs::generate_config_with_examples()).unwrap();
        assert_eq!(full.export.default_passphrase, "default123");
        assert_eq!(full.uploader.timeout_seconds, 300);
    }

    #[tokio::test]
    async fn test_existing_file_needs_force() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("courier.toml");
        fs::write(&output, "keep me").unwrap();

        let mut args = InitArgs {
            output: output.to_string_lossy().to_string(),
            with_examples: true,
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), 2);
        assert_eq!(fs::read_to_string(&output).unwrap(), "keep me");

        args.force = true;
        assert_eq!(args.execute().await.unwrap(), 0);
        assert!(fs::read_to_string(&output).unwrap().contains("[uploader]"));
    }
}
