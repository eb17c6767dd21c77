//! Logging and observability
//!
//! Structured logging through `tracing`:
//! - Console output for operators
//! - JSON log files with rotation
//! - Helper macros for the events every export emits
//!
//! Passphrases and raw descriptions must never be passed to these macros.
//!
//! # Example
//!
//! ```no_run
//! use study_courier::logging::init_logging;
//! use study_courier::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Courier started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log a study moving to a new export state
///
/// # Example
///
/// ```no_run
/// use study_courier::log_state_transition;
///
/// log_state_transition!("6b9e19d9", "Idle", "Claimed");
/// ```
#[macro_export]
macro_rules! log_state_transition {
    ($study_id:expr, $from:expr, $to:expr) => {
        tracing::info!(
            study_id = %$study_id,
            from = %$from,
            to = %$to,
            "Export state transition"
        )
    };
}

/// Log the result of one delivery request
///
/// # Example
///
/// ```no_run
/// use study_courier::log_delivery_result;
///
/// let ok: Result<(), String> = Ok(());
/// log_delivery_result!("P1_nodate_CT.zip", "alice@example.org", ok);
/// ```
#[macro_export]
macro_rules! log_delivery_result {
    ($artifact:expr, $recipient:expr, $result:expr) => {
        match &$result {
            Ok(_) => tracing::info!(
                artifact = %$artifact,
                recipient = %$recipient,
                "Delivery request accepted"
            ),
            Err(e) => tracing::error!(
                artifact = %$artifact,
                recipient = %$recipient,
                error = %e,
                "Delivery request failed"
            ),
        }
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use study_courier::log_error_with_context;
/// use study_courier::domain::CourierError;
///
/// let error = CourierError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        )
    };
}

/// Log a retry attempt before sleeping `delay`
///
/// # Example
///
/// ```no_run
/// use study_courier::log_retry_attempt;
/// use std::time::Duration;
///
/// log_retry_attempt!("GET /system", 2, 3, Duration::from_millis(400), "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($operation:expr, $attempt:expr, $max_attempts:expr, $delay:expr, $reason:expr) => {
        tracing::warn!(
            operation = $operation,
            attempt = $attempt,
            max_attempts = $max_attempts,
            delay_ms = $delay.as_millis() as u64,
            reason = %$reason,
            "Retrying request after error"
        )
    };
}
