//! Configuration management for the courier.
//!
//! # Overview
//!
//! The courier uses one TOML configuration file with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `COURIER_<SECTION>_<KEY>` environment overrides
//! - Default values for every optional setting
//! - Validation on load
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use study_courier::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("courier.toml")?;
//!
//! println!("Host: {}", config.host.base_url);
//! println!("Export area: {}", config.export.export_dir.display());
//! println!("Delivery queue: {}", config.queue.queue_dir.display());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level
//! - [`HostConfig`] - Imaging server connection, change feed and settle delay
//! - [`ExportConfig`] - Export area, ledger, passphrase default, delivery requests
//! - [`QueueConfig`] - Delivery queue directory and artifact extension
//! - [`ServerConfig`] - Bind address of the delivery endpoint
//! - [`UploaderConfig`] - External uploader command and watcher interval
//! - [`MonitorConfig`] - Health checks, outage alerts, recovery sweep
//! - [`LoggingConfig`] - Local log files
//!
//! # Example Configuration
//!
//! ```toml
//! [host]
//! base_url = "http://orthanc:8042"
//! username = "orthanc"
//! password = "${COURIER_HOST_PASSWORD}"
//!
//! [export]
//! export_dir = "/exports"
//!
//! [queue]
//! queue_dir = "/mailqueue"
//!
//! [uploader]
//! username = "sender@example.org"
//! api_key = "${FILESENDER_API_KEY}"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, parse_config, resolve_config_path};
pub use schema::{
    ApplicationConfig, CourierConfig, ExportConfig, HostConfig, LoggingConfig, MonitorConfig,
    QueueConfig, RetryConfig, ServerConfig, UploaderConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
