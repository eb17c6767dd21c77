//! Local delivery endpoint
//!
//! `POST /send` receives one form-encoded delivery request per recipient
//! and moves the named artifact from the export area into the delivery
//! queue. `GET /health` answers 200 while the service is up.

pub mod routes;

use crate::core::transfer::QueueTransfer;
use crate::domain::{CourierError, Result};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub transfer: QueueTransfer,
}

impl AppState {
    pub fn new(transfer: QueueTransfer) -> Self {
        Self { transfer }
    }
}

/// Build the endpoint router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/send", post(routes::send))
        .route("/health", get(routes::health))
        .with_state(state)
}

/// Serve the router on `bind` until `shutdown` turns true
pub async fn start_server(
    bind: SocketAddr,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| CourierError::Io(format!("Failed to bind {bind}: {e}")))?;

    tracing::info!(address = %bind, "Delivery endpoint listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|e| CourierError::Other(format!("Delivery endpoint failed: {e}")))?;

    tracing::info!("Delivery endpoint stopped");
    Ok(())
}
