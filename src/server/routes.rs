//! Endpoint handlers

use crate::core::transfer::TransferOutcome;
use crate::domain::TransferError;
use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Form;
use serde::Deserialize;

/// Form body of `POST /send`. Fields are optional so a missing one yields
/// a 400 from the handler instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct SendForm {
    #[serde(rename = "studyId", default)]
    pub study_id: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// POST /send - move one artifact into the delivery queue
pub async fn send(State(state): State<AppState>, Form(form): Form<SendForm>) -> impl IntoResponse {
    let study_id = form.study_id.unwrap_or_default();
    let email = form.email.unwrap_or_default();
    let file = form.file.unwrap_or_default();

    tracing::info!(
        study_id = %study_id,
        file = %file,
        email = %email,
        "Delivery request received"
    );

    if file.trim().is_empty() {
        tracing::warn!(study_id = %study_id, "Delivery request without a file name");
        return (StatusCode::BAD_REQUEST, "missing file".to_string());
    }

    let transfer = state.transfer.clone();
    let name = file.clone();
    let result = tokio::task::spawn_blocking(move || transfer.transfer_by_name(&name))
        .await
        .unwrap_or_else(|e| Err(TransferError::Failed(format!("transfer task failed: {e}"))));

    match result {
        Ok(TransferOutcome::Moved {
            bytes,
            source_removed,
        }) => {
            tracing::info!(
                file = %file,
                email = %email,
                bytes,
                source_removed,
                "Artifact moved to the delivery queue"
            );
            (StatusCode::OK, "OK".to_string())
        }
        Ok(TransferOutcome::AlreadyQueued) => {
            tracing::info!(file = %file, email = %email, "Artifact already queued");
            (StatusCode::OK, "OK".to_string())
        }
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                tracing::error!(file = %file, error = %e, "Transfer failed");
            } else {
                tracing::warn!(file = %file, error = %e, "Delivery request rejected");
            }
            (status, e.to_string())
        }
    }
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
