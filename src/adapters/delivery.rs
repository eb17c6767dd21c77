//! Client for the local delivery endpoint
//!
//! The coordinator asks the endpoint to move an artifact into the delivery
//! queue once per recipient.

use crate::adapters::retry::retry_with_backoff;
use crate::config::ExportConfig;
use crate::domain::{ArtifactName, CourierError, PipelineError, Result, StudyId};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Form body of `POST /send`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    #[serde(rename = "studyId")]
    pub study_id: String,
    pub file: String,
    pub email: String,
}

impl DeliveryRequest {
    pub fn new(study_id: &StudyId, file: &ArtifactName, email: &str) -> Self {
        Self {
            study_id: study_id.to_string(),
            file: file.to_string(),
            email: email.to_string(),
        }
    }
}

/// Sends delivery requests
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn request_delivery(&self, request: &DeliveryRequest) -> Result<()>;
}

#[derive(Debug)]
struct AttemptError {
    retryable: bool,
    message: String,
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// [`DeliveryClient`] posting form-encoded requests over HTTP
pub struct HttpDeliveryClient {
    endpoint: String,
    client: Client,
    config: ExportConfig,
}

impl HttpDeliveryClient {
    pub fn new(config: ExportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.delivery_timeout_seconds))
            .build()
            .map_err(|e| {
                CourierError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            endpoint: config.delivery_endpoint.clone(),
            client,
            config,
        })
    }

    async fn attempt(&self, request: &DeliveryRequest) -> std::result::Result<(), AttemptError> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(request)
            .send()
            .await
            .map_err(|e| AttemptError {
                retryable: true,
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AttemptError {
            retryable: status.is_server_error(),
            message: format!("endpoint returned {status}: {}", body.trim()),
        })
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn request_delivery(&self, request: &DeliveryRequest) -> Result<()> {
        retry_with_backoff(
            &self.config.delivery_retry,
            "delivery request",
            |e: &AttemptError| e.retryable,
            || self.attempt(request),
        )
        .await
        .map_err(|e| PipelineError::DeliveryRequestFailed(e.message).into())
    }
}
