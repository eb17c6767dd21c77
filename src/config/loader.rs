//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::CourierConfig;
use super::secret::secret_string;
use crate::domain::errors::CourierError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "COURIER_CONFIG";

/// Configuration file used when neither `--config` nor `COURIER_CONFIG` is given
pub const DEFAULT_CONFIG_FILE: &str = "courier.toml";

/// Resolves the configuration path: explicit argument, then `COURIER_CONFIG`,
/// then `courier.toml` in the working directory
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into CourierConfig
/// 4. Applies environment variable overrides (COURIER_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if the file cannot be read, a referenced variable is
/// unset, parsing fails, or validation fails
///
/// # Examples
///
/// ```no_run
/// use study_courier::config::loader::load_config;
///
/// let config = load_config("courier.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<CourierConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(CourierError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        CourierError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(contents: &str) -> Result<CourierConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: CourierConfig = toml::from_str(&contents)
        .map_err(|e| CourierError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config);

    config.validate().map_err(|e| {
        CourierError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| CourierError::Other(format!("invalid substitution pattern: {e}")))?;
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{var_name}}}");
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        lines.push(processed_line);
    }

    if !missing_vars.is_empty() {
        return Err(CourierError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Applies environment variable overrides using COURIER_* prefix
///
/// Environment variables follow the pattern: COURIER_<SECTION>_<KEY>
/// For example: COURIER_HOST_BASE_URL, COURIER_EXPORT_EXPORT_DIR.
/// Values that fail to parse are ignored.
fn apply_env_overrides(config: &mut CourierConfig) {
    if let Ok(val) = std::env::var("COURIER_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Host overrides
    if let Ok(val) = std::env::var("COURIER_HOST_BASE_URL") {
        config.host.base_url = val;
    }
    if let Ok(val) = std::env::var("COURIER_HOST_USERNAME") {
        config.host.username = Some(val);
    }
    if let Ok(val) = std::env::var("COURIER_HOST_PASSWORD") {
        config.host.password = Some(secret_string(val));
    }
    if let Some(val) = env_parse("COURIER_HOST_TLS_VERIFY") {
        config.host.tls_verify = val;
    }
    if let Some(val) = env_parse("COURIER_HOST_TIMEOUT_SECONDS") {
        config.host.timeout_seconds = val;
    }
    if let Some(val) = env_parse("COURIER_HOST_SETTLE_DELAY_MS") {
        config.host.settle_delay_ms = val;
    }
    if let Some(val) = env_parse("COURIER_HOST_CHANGE_POLL_INTERVAL_SECONDS") {
        config.host.change_poll_interval_seconds = val;
    }

    // Export overrides
    if let Ok(val) = std::env::var("COURIER_EXPORT_EXPORT_DIR") {
        config.export.export_dir = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("COURIER_EXPORT_LEDGER_FILE") {
        config.export.ledger_file = val;
    }
    if let Ok(val) = std::env::var("COURIER_EXPORT_DEFAULT_PASSPHRASE") {
        config.export.default_passphrase = val;
    }
    if let Some(val) = env_parse("COURIER_EXPORT_DELETE_ORIGINAL") {
        config.export.delete_original = val;
    }
    if let Ok(val) = std::env::var("COURIER_EXPORT_DELIVERY_ENDPOINT") {
        config.export.delivery_endpoint = val;
    }
    if let Some(val) = env_parse("COURIER_EXPORT_DELIVERY_PACING_MS") {
        config.export.delivery_pacing_ms = val;
    }
    if let Ok(val) = std::env::var("COURIER_EXPORT_COMPRESSOR_PROGRAM") {
        config.export.compressor_program = val;
    }

    // Queue overrides
    if let Ok(val) = std::env::var("COURIER_QUEUE_QUEUE_DIR") {
        config.queue.queue_dir = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("COURIER_QUEUE_ARTIFACT_EXTENSION") {
        config.queue.artifact_extension = val;
    }

    if let Some(val) = env_parse("COURIER_SERVER_BIND_ADDRESS") {
        config.server.bind_address = val;
    }

    // Uploader overrides
    if let Ok(val) = std::env::var("COURIER_UPLOADER_PROGRAM") {
        config.uploader.program = val;
    }
    if let Ok(val) = std::env::var("COURIER_UPLOADER_USERNAME") {
        config.uploader.username = Some(val);
    }
    if let Ok(val) = std::env::var("COURIER_UPLOADER_API_KEY") {
        config.uploader.api_key = Some(secret_string(val));
    }
    if let Some(val) = env_parse("COURIER_UPLOADER_TIMEOUT_SECONDS") {
        config.uploader.timeout_seconds = val;
    }
    if let Some(val) = env_parse("COURIER_UPLOADER_POLL_INTERVAL_SECONDS") {
        config.uploader.poll_interval_seconds = val;
    }

    // Monitor overrides
    if let Some(val) = env_parse("COURIER_MONITOR_ENABLED") {
        config.monitor.enabled = val;
    }
    if let Some(val) = env_parse("COURIER_MONITOR_INTERVAL_SECONDS") {
        config.monitor.interval_seconds = val;
    }
    if let Ok(val) = std::env::var("COURIER_MONITOR_ADMIN_RECIPIENT") {
        config.monitor.admin_recipient = Some(val);
    }
    if let Ok(val) = std::env::var("COURIER_MONITOR_STATE_DIR") {
        config.monitor.state_dir = PathBuf::from(val);
    }

    // Logging overrides
    if let Some(val) = env_parse("COURIER_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val;
    }
    if let Ok(val) = std::env::var("COURIER_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Ok(val) = std::env::var("COURIER_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }
}
