//! Configuration schema types
//!
//! This module defines the configuration structure that maps to `courier.toml`.

use crate::config::SecretString;
use crate::core::sanitize::DEFAULT_PASSPHRASE;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main courier configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Host imaging server connection
    pub host: HostConfig,

    /// Export area, ledger and delivery request settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Delivery queue area
    #[serde(default)]
    pub queue: QueueConfig,

    /// Local HTTP delivery endpoint
    #[serde(default)]
    pub server: ServerConfig,

    /// External uploader invocation
    #[serde(default)]
    pub uploader: UploaderConfig,

    /// Health monitor and recovery sweep
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CourierConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.host.validate()?;
        self.export.validate()?;
        self.queue.validate()?;
        self.uploader.validate()?;
        self.monitor.validate()?;
        self.logging.validate()?;

        if self.export.export_dir == self.queue.queue_dir {
            return Err(
                "export.export_dir and queue.queue_dir must be different directories".to_string(),
            );
        }
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = self
            .backoff_multiplier
            .powf(attempt.saturating_sub(1) as f64);
        let delay_ms = (self.initial_delay_ms as f64 * factor) as u64;
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    fn validate(&self, section: &str) -> Result<(), String> {
        if self.max_retries == 0 {
            return Err(format!("{section}.retry.max_retries must be at least 1"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(format!(
                "{section}.retry.backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Host imaging server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Base URL of the host REST API (e.g. `http://orthanc:8042`)
    pub base_url: String,

    /// Username for basic authentication (optional)
    #[serde(default)]
    pub username: Option<String>,

    /// Password for basic authentication (optional)
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub password: Option<SecretString>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// TLS certificate verification enabled
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    /// Retry configuration for idempotent requests
    #[serde(default)]
    pub retry: RetryConfig,

    /// Interval between change-feed polls in seconds
    #[serde(default = "default_change_poll_interval_seconds")]
    pub change_poll_interval_seconds: u64,

    /// Maximum number of changes fetched per poll
    #[serde(default = "default_change_batch_size")]
    pub change_batch_size: u32,

    /// Delay between metadata rewrite and archive download, in milliseconds
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// How many times to poll for the rewritten study before falling back
    /// to the fixed settle delay
    #[serde(default = "default_visibility_poll_attempts")]
    pub visibility_poll_attempts: u32,
}

impl HostConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        if self.base_url.is_empty() {
            return Err("host.base_url cannot be empty".to_string());
        }
        validate_http_url("host.base_url", &self.base_url)?;

        if self.username.is_some() != self.password.is_some() {
            return Err(
                "host.username and host.password must be set together".to_string(),
            );
        }
        if let Some(password) = &self.password {
            if password.expose_secret().is_empty() {
                return Err("host.password cannot be empty when set".to_string());
            }
        }

        if self.timeout_seconds == 0 {
            return Err("host.timeout_seconds must be greater than 0".to_string());
        }
        if self.change_batch_size == 0 || self.change_batch_size > 10_000 {
            return Err(format!(
                "host.change_batch_size must be between 1 and 10000, got {}",
                self.change_batch_size
            ));
        }
        if self.change_poll_interval_seconds == 0 {
            return Err("host.change_poll_interval_seconds must be greater than 0".to_string());
        }

        self.retry.validate("host")?;
        Ok(())
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Settle delay after a metadata rewrite
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8042".to_string(),
            username: None,
            password: None,
            timeout_seconds: default_timeout_seconds(),
            tls_verify: true,
            retry: RetryConfig::default(),
            change_poll_interval_seconds: default_change_poll_interval_seconds(),
            change_batch_size: default_change_batch_size(),
            settle_delay_ms: default_settle_delay_ms(),
            visibility_poll_attempts: default_visibility_poll_attempts(),
        }
    }
}

/// Export area configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory that receives published artifacts and the ledger file
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Ledger file name inside `export_dir`
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,

    /// Passphrase used when the description carries no `pw=` token
    #[serde(default = "default_passphrase")]
    pub default_passphrase: String,

    /// Delete the original study from the host once the artifact is durable
    #[serde(default = "default_true")]
    pub delete_original: bool,

    /// URL of the delivery endpoint (`POST`, form-encoded)
    #[serde(default = "default_delivery_endpoint")]
    pub delivery_endpoint: String,

    /// Pause between consecutive delivery requests, in milliseconds
    #[serde(default = "default_delivery_pacing_ms")]
    pub delivery_pacing_ms: u64,

    /// Timeout of one delivery request, in seconds
    #[serde(default = "default_timeout_seconds")]
    pub delivery_timeout_seconds: u64,

    /// Retry policy for delivery requests
    #[serde(default)]
    pub delivery_retry: RetryConfig,

    /// Compression/encryption executable (7-Zip compatible)
    #[serde(default = "default_compressor_program")]
    pub compressor_program: String,
}

impl ExportConfig {
    fn validate(&self) -> Result<(), String> {
        if self.export_dir.as_os_str().is_empty() {
            return Err("export.export_dir cannot be empty".to_string());
        }
        if self.ledger_file.is_empty()
            || self.ledger_file.contains('/')
            || self.ledger_file.contains("..")
        {
            return Err(format!(
                "export.ledger_file must be a plain file name, got '{}'",
                self.ledger_file
            ));
        }
        if self.default_passphrase.is_empty() {
            return Err("export.default_passphrase cannot be empty".to_string());
        }
        validate_http_url("export.delivery_endpoint", &self.delivery_endpoint)?;
        if self.delivery_timeout_seconds == 0 {
            return Err("export.delivery_timeout_seconds must be greater than 0".to_string());
        }
        if self.compressor_program.trim().is_empty() {
            return Err("export.compressor_program cannot be empty".to_string());
        }
        self.delivery_retry.validate("export.delivery")?;
        Ok(())
    }

    /// Full path of the ledger file
    pub fn ledger_path(&self) -> PathBuf {
        self.export_dir.join(&self.ledger_file)
    }

    /// Pause between consecutive delivery requests
    pub fn delivery_pacing(&self) -> Duration {
        Duration::from_millis(self.delivery_pacing_ms)
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
            ledger_file: default_ledger_file(),
            default_passphrase: default_passphrase(),
            delete_original: true,
            delivery_endpoint: default_delivery_endpoint(),
            delivery_pacing_ms: default_delivery_pacing_ms(),
            delivery_timeout_seconds: default_timeout_seconds(),
            delivery_retry: RetryConfig::default(),
            compressor_program: default_compressor_program(),
        }
    }
}

/// Delivery queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory holding relocated artifacts and their marker files
    #[serde(default = "default_queue_dir")]
    pub queue_dir: PathBuf,

    /// Extension (without dot) of artifact files
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
}

impl QueueConfig {
    fn validate(&self) -> Result<(), String> {
        if self.queue_dir.as_os_str().is_empty() {
            return Err("queue.queue_dir cannot be empty".to_string());
        }
        if self.artifact_extension.is_empty() || self.artifact_extension.contains('.') {
            return Err(format!(
                "queue.artifact_extension must be a bare extension like 'zip', got '{}'",
                self.artifact_extension
            ));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_dir: default_queue_dir(),
            artifact_extension: default_artifact_extension(),
        }
    }
}

/// HTTP delivery endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the delivery endpoint listens on
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// External uploader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Executable to run
    #[serde(default = "default_uploader_program")]
    pub program: String,

    /// Arguments placed before the artifact path
    #[serde(default = "default_uploader_args")]
    pub args: Vec<String>,

    /// Account name passed to the uploader
    #[serde(default)]
    pub username: Option<String>,

    /// API key passed to the uploader
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Timeout of one upload attempt in seconds
    #[serde(default = "default_upload_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Interval between watcher cycles in seconds
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
}

impl UploaderConfig {
    fn validate(&self) -> Result<(), String> {
        if self.program.trim().is_empty() {
            return Err("uploader.program cannot be empty".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("uploader.timeout_seconds must be greater than 0".to_string());
        }
        if self.poll_interval_seconds == 0 {
            return Err("uploader.poll_interval_seconds must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Timeout of one upload attempt
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Interval between watcher cycles
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            program: default_uploader_program(),
            args: default_uploader_args(),
            username: None,
            api_key: None,
            timeout_seconds: default_upload_timeout_seconds(),
            poll_interval_seconds: default_poll_interval_seconds(),
        }
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Run the health monitor inside `serve`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between health checks in seconds
    #[serde(default = "default_monitor_interval_seconds")]
    pub interval_seconds: u64,

    /// Attempts per health check
    #[serde(default = "default_health_attempts")]
    pub health_attempts: u32,

    /// Delay between health check attempts in seconds
    #[serde(default = "default_health_retry_delay_seconds")]
    pub health_retry_delay_seconds: u64,

    /// Recipient of outage alerts (defaults to the uploader account)
    #[serde(default)]
    pub admin_recipient: Option<String>,

    /// Directory for the alert state file and alert attachments
    #[serde(default = "default_monitor_state_dir")]
    pub state_dir: PathBuf,
}

impl MonitorConfig {
    fn validate(&self) -> Result<(), String> {
        if self.enabled {
            if self.interval_seconds == 0 {
                return Err("monitor.interval_seconds must be greater than 0".to_string());
            }
            if self.health_attempts == 0 {
                return Err("monitor.health_attempts must be at least 1".to_string());
            }
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_monitor_interval_seconds(),
            health_attempts: default_health_attempts(),
            health_retry_delay_seconds: default_health_retry_delay_seconds(),
            admin_recipient: None,
            state_dir: default_monitor_state_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log file path
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation (daily, hourly)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        if self.local_enabled && self.local_path.is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled".to_string());
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<(), String> {
    let parsed = url::Url::parse(value).map_err(|e| format!("{field} is not a valid URL: {e}"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(format!("{field} must start with http:// or https://"));
    }
    Ok(())
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_change_poll_interval_seconds() -> u64 {
    5
}

fn default_change_batch_size() -> u32 {
    100
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_visibility_poll_attempts() -> u32 {
    5
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("/exports")
}

fn default_ledger_file() -> String {
    "mapping.json".to_string()
}

fn default_passphrase() -> String {
    DEFAULT_PASSPHRASE.to_string()
}

fn default_delivery_endpoint() -> String {
    "http://127.0.0.1:8043/send".to_string()
}

fn default_delivery_pacing_ms() -> u64 {
    500
}

fn default_compressor_program() -> String {
    "7z".to_string()
}

fn default_queue_dir() -> PathBuf {
    PathBuf::from("/mailqueue")
}

fn default_artifact_extension() -> String {
    "zip".to_string()
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8043))
}

fn default_uploader_program() -> String {
    "python3".to_string()
}

fn default_uploader_args() -> Vec<String> {
    vec!["/filesender_cli/filesender.py".to_string()]
}

fn default_upload_timeout_seconds() -> u64 {
    300
}

fn default_poll_interval_seconds() -> u64 {
    10
}

fn default_monitor_interval_seconds() -> u64 {
    120
}

fn default_health_attempts() -> u32 {
    3
}

fn default_health_retry_delay_seconds() -> u64 {
    5
}

fn default_monitor_state_dir() -> PathBuf {
    PathBuf::from("/logs/watcher")
}

fn default_local_path() -> String {
    "/logs/courier".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}
