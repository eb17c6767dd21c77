//! Domain error types
//!
//! This module defines the error hierarchy for the courier pipeline.
//! All errors are domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main courier error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Host imaging server errors
    #[error("Host server error: {0}")]
    Host(#[from] HostError),

    /// Pipeline stage errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Host server errors
///
/// Errors that occur when talking to the imaging server REST API.
/// These errors don't expose third-party HTTP client types.
#[derive(Debug, Error)]
pub enum HostError {
    /// Failed to connect to the host server
    #[error("Failed to connect to host server: {0}")]
    ConnectionFailed(String),

    /// Invalid response from server
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),
}

impl HostError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HostError::ConnectionFailed(_) | HostError::ServerError { .. } | HostError::Timeout(_)
        )
    }
}

/// Pipeline stage failures
///
/// One variant per stage that can fail. Failures before a durable artifact
/// exists abort the export of a study; delivery and upload failures are
/// isolated to one recipient or one watcher cycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The host did not return a new identifier for the rewritten study
    #[error("Metadata cleanup failed: {0}")]
    MetadataCleanupFailed(String),

    /// Neither the rewritten nor the original study produced archive bytes
    #[error("Archive unavailable: {0}")]
    ArchiveUnavailable(String),

    /// The compression/encryption tool failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// The recipient ledger could not be rewritten
    #[error("Ledger write failed: {0}")]
    LedgerWriteFailed(String),

    /// The artifact could not be moved into the delivery queue
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// A delivery request to the local endpoint failed
    #[error("Delivery request failed: {0}")]
    DeliveryRequestFailed(String),

    /// The external uploader reported failure
    #[error("Upload failed: {0}")]
    UploadFailed(String),
}

/// Queue transfer failures, split by who is at fault
#[derive(Debug, Error)]
pub enum TransferError {
    /// The artifact name is empty or could escape its directory
    #[error("Invalid artifact name: {0}")]
    InvalidName(String),

    /// The artifact is in neither the export area nor the queue
    #[error("Artifact not found: {0}")]
    SourceMissing(String),

    /// Copy, size check or rename failed; the source is untouched
    #[error("Transfer failed: {0}")]
    Failed(String),
}

impl TransferError {
    /// HTTP status reported by the delivery endpoint
    pub fn status_code(&self) -> u16 {
        match self {
            TransferError::InvalidName(_) => 400,
            TransferError::SourceMissing(_) => 404,
            TransferError::Failed(_) => 500,
        }
    }
}

impl From<TransferError> for CourierError {
    fn from(err: TransferError) -> Self {
        CourierError::Pipeline(PipelineError::TransferFailed(err.to_string()))
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for CourierError {
    fn from(err: std::io::Error) -> Self {
        CourierError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        CourierError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for CourierError {
    fn from(err: toml::de::Error) -> Self {
        CourierError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_courier_error_display() {
        let err = CourierError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_host_error_conversion() {
        let host_err = HostError::ConnectionFailed("Network error".to_string());
        let err: CourierError = host_err.into();
        assert!(matches!(err, CourierError::Host(_)));
    }

    #[test]
    fn test_pipeline_error_conversion() {
        let err: CourierError = PipelineError::EncryptionFailed("exit 2".to_string()).into();
        assert!(matches!(
            err,
            CourierError::Pipeline(PipelineError::EncryptionFailed(_))
        ));
        assert_eq!(err.to_string(), "Pipeline error: Encryption failed: exit 2");
    }

    #[test]
    fn test_host_error_retryable() {
        assert!(HostError::Timeout("t".to_string()).is_retryable());
        assert!(HostError::ServerError {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!HostError::NotFound("x".to_string()).is_retryable());
        assert!(!HostError::ClientError {
            status: 400,
            message: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_transfer_error_status_codes() {
        assert_eq!(TransferError::InvalidName("..".to_string()).status_code(), 400);
        assert_eq!(TransferError::SourceMissing("a.zip".to_string()).status_code(), 404);
        assert_eq!(TransferError::Failed("disk full".to_string()).status_code(), 500);

        let err: CourierError = TransferError::Failed("disk full".to_string()).into();
        assert!(matches!(
            err,
            CourierError::Pipeline(PipelineError::TransferFailed(_))
        ));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: CourierError = io_err.into();
        assert!(matches!(err, CourierError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: CourierError = json_err.into();
        assert!(matches!(err, CourierError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: CourierError = toml_err.into();
        assert!(matches!(err, CourierError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }
}
