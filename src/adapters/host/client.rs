//! REST client for an Orthanc-compatible imaging server

use super::models::{
    ChangeBatch, ModifyRequest, ModifyResponse, PatientResource, StudyResource, SystemInfo,
};
use super::traits::HostServer;
use crate::adapters::retry::retry_with_backoff;
use crate::config::HostConfig;
use crate::domain::{CourierError, HostError, Result, StudyId};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

/// Maximum length of the short `StudyID` tag written during a rewrite
const STUDY_ID_TAG_MAX_CHARS: usize = 16;

/// HTTP client for the host imaging server
///
/// Read requests are retried with exponential backoff; the rewrite and
/// delete calls are sent once.
///
/// # Example
///
/// ```no_run
/// use study_courier::adapters::host::{HostServer, OrthancClient};
/// use study_courier::config::HostConfig;
///
/// # async fn example() -> study_courier::domain::Result<()> {
/// let client = OrthancClient::new(HostConfig::default())?;
/// let info = client.system_info().await?;
/// println!("{:?}", info.version);
/// # Ok(())
/// # }
/// ```
pub struct OrthancClient {
    base_url: String,
    client: Client,
    config: HostConfig,
}

impl OrthancClient {
    /// Build a client from the host configuration
    pub fn new(config: HostConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let mut client_builder = ClientBuilder::new()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10));

        if !config.tls_verify {
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder.build().map_err(|e| {
            CourierError::Configuration(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            base_url,
            client,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build authorization header value
    fn auth_header_value(&self) -> Option<String> {
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password)
        {
            let credentials = format!("{username}:{}", password.expose_secret().as_str());
            let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
            Some(format!("Basic {encoded}"))
        } else {
            None
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth_header_value() {
            Some(auth) => request.header("Authorization", auth),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, HostError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<T, HostError> {
        let url = self.url(path);
        retry_with_backoff(&self.config.retry, path, HostError::is_retryable, || async {
            let response = self.send(self.client.get(&url)).await?;
            response
                .json::<T>()
                .await
                .map_err(|e| HostError::InvalidResponse(e.to_string()))
        })
        .await
    }

    /// GET returning `None` on 404
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get_json(path).await {
            Ok(value) => Ok(Some(value)),
            Err(HostError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> HostError {
    if err.is_timeout() {
        HostError::Timeout(err.to_string())
    } else {
        HostError::ConnectionFailed(err.to_string())
    }
}

fn status_error(status: StatusCode, body: String) -> HostError {
    if status == StatusCode::NOT_FOUND {
        HostError::NotFound(body)
    } else if status.is_server_error() {
        HostError::ServerError {
            status: status.as_u16(),
            message: body,
        }
    } else {
        HostError::ClientError {
            status: status.as_u16(),
            message: body,
        }
    }
}

fn study_id_tag(description: &str) -> String {
    description.chars().take(STUDY_ID_TAG_MAX_CHARS).collect()
}

#[async_trait]
impl HostServer for OrthancClient {
    async fn get_study(&self, study_id: &StudyId) -> Result<Option<StudyResource>> {
        self.get_optional(&format!("/studies/{study_id}")).await
    }

    async fn get_patient(&self, patient_id: &str) -> Result<Option<PatientResource>> {
        self.get_optional(&format!("/patients/{patient_id}")).await
    }

    async fn modify_study_description(
        &self,
        study_id: &StudyId,
        description: &str,
    ) -> Result<StudyId> {
        let mut replace = HashMap::new();
        replace.insert("StudyDescription".to_string(), description.to_string());
        replace.insert("StudyID".to_string(), study_id_tag(description));
        let body = ModifyRequest {
            replace,
            force: true,
        };

        let url = self.url(&format!("/studies/{study_id}/modify"));
        let response = self.send(self.client.post(&url).json(&body)).await?;
        let modified: ModifyResponse = response
            .json()
            .await
            .map_err(|e| HostError::InvalidResponse(e.to_string()))?;

        let new_id = modified.id.ok_or_else(|| {
            HostError::InvalidResponse("modify response carries no ID".to_string())
        })?;
        StudyId::new(new_id).map_err(|e| HostError::InvalidResponse(e).into())
    }

    async fn study_exists(&self, study_id: &StudyId) -> Result<bool> {
        Ok(self.get_study(study_id).await?.is_some())
    }

    async fn download_archive(&self, study_id: &StudyId) -> Result<Vec<u8>> {
        let path = format!("/studies/{study_id}/archive");
        let url = self.url(&path);
        let bytes = retry_with_backoff(&self.config.retry, &path, HostError::is_retryable, || async {
            let response = self.send(self.client.get(&url)).await?;
            response
                .bytes()
                .await
                .map_err(|e| HostError::InvalidResponse(e.to_string()))
        })
        .await?;
        Ok(bytes.to_vec())
    }

    async fn delete_study(&self, study_id: &StudyId) -> Result<()> {
        let url = self.url(&format!("/studies/{study_id}"));
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn changes(&self, since: u64, limit: u32) -> Result<ChangeBatch> {
        Ok(self
            .get_json(&format!("/changes?since={since}&limit={limit}"))
            .await?)
    }

    async fn list_studies(&self) -> Result<Vec<StudyId>> {
        let ids: Vec<String> = self.get_json("/studies").await?;
        Ok(ids
            .into_iter()
            .filter_map(|id| StudyId::new(id).ok())
            .collect())
    }

    async fn system_info(&self) -> Result<SystemInfo> {
        Ok(self.get_json("/system").await?)
    }
}
