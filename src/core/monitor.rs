//! Host health monitoring and recovery sweeps
//!
//! Every interval the monitor checks that the host answers `/system`. On an
//! outage the administrator gets one alert through the uploader; the alert
//! state lives in a file so a restart does not alert again. After recovery,
//! and once at startup, it looks for work that fell through the cracks:
//! stable studies that still carry delivery instructions and published
//! artifacts that never reached the queue.

use crate::adapters::command::FileSenderUploader;
use crate::config::{CourierConfig, MonitorConfig};
use crate::core::export::ExportCoordinator;
use crate::core::fsutil;
use crate::core::sanitize::{extract_recipients, find_passphrase};
use crate::core::transfer::{QueueTransfer, TransferOutcome};
use crate::core::watcher::list_artifacts;
use crate::domain::{CourierError, Result};
use crate::log_error_with_context;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Present while an outage alert has been sent and not yet cleared
pub const ALERT_STATE_FILE: &str = "notification_state.txt";

/// Attachment uploaded with an alert
pub const ALERT_FILE: &str = "admin_alert.txt";

const OUTAGE_MESSAGE: &str =
    "Host imaging server is not reachable after repeated health checks. Please check it manually.";

/// What one monitor cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub healthy: bool,
    pub alert_sent: bool,
    pub recovered: bool,
    pub studies_retriggered: usize,
    pub artifacts_requeued: usize,
}

pub struct HealthMonitor {
    config: MonitorConfig,
    coordinator: Arc<ExportCoordinator>,
    transfer: QueueTransfer,
    uploader: FileSenderUploader,
    extension: String,
    sweep_studies: bool,
    swept_once: bool,
}

impl HealthMonitor {
    pub fn new(
        config: MonitorConfig,
        coordinator: Arc<ExportCoordinator>,
        transfer: QueueTransfer,
        uploader: FileSenderUploader,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            config,
            coordinator,
            transfer,
            uploader,
            extension: extension.into(),
            sweep_studies: true,
            swept_once: false,
        }
    }

    pub fn from_config(
        config: &CourierConfig,
        coordinator: Arc<ExportCoordinator>,
        uploader: FileSenderUploader,
    ) -> Self {
        Self::new(
            config.monitor.clone(),
            coordinator,
            QueueTransfer::new(&config.export.export_dir, &config.queue.queue_dir),
            uploader,
            &config.queue.artifact_extension,
        )
        // kept originals still carry their delivery instructions
        .with_study_sweep(config.export.delete_original)
    }

    /// Enable or disable re-running stable studies that still carry instructions
    pub fn with_study_sweep(mut self, enabled: bool) -> Self {
        self.sweep_studies = enabled;
        self
    }

    fn state_path(&self) -> PathBuf {
        self.config.state_dir.join(ALERT_STATE_FILE)
    }

    /// Whether the host answers, trying up to `health_attempts` times
    pub async fn check_health(&self) -> bool {
        let attempts = self.config.health_attempts.max(1);
        let delay = Duration::from_secs(self.config.health_retry_delay_seconds);
        for attempt in 1..=attempts {
            match self.coordinator.host().system_info().await {
                Ok(info) => {
                    tracing::debug!(
                        version = info.version.as_deref().unwrap_or("unknown"),
                        "Host health check passed"
                    );
                    return true;
                }
                Err(e) => tracing::warn!(
                    attempt = attempt,
                    max_attempts = attempts,
                    error = %e,
                    "Host health check failed"
                ),
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        false
    }

    pub fn alert_pending(&self) -> bool {
        self.state_path().exists()
    }

    /// Send `message` to the administrator unless an alert is already pending.
    ///
    /// Returns whether an alert was sent.
    pub async fn notify_admin(&self, message: &str) -> Result<bool> {
        if self.alert_pending() {
            tracing::info!("Admin alert skipped; already notified for the current issue");
            return Ok(false);
        }

        let recipient = self
            .config
            .admin_recipient
            .as_deref()
            .or_else(|| self.uploader.username())
            .ok_or_else(|| {
                CourierError::Configuration(
                    "no admin recipient: set monitor.admin_recipient or uploader.username".to_string(),
                )
            })?
            .to_string();

        let state_dir = self.config.state_dir.clone();
        let alert_path = state_dir.join(ALERT_FILE);
        let alert_text = format!("[{}] {message}\n", Utc::now().to_rfc3339());
        let write_path = alert_path.clone();
        fsutil::run_blocking(move || {
            std::fs::create_dir_all(&state_dir)?;
            fsutil::atomic_write(&write_path, alert_text.as_bytes())?;
            Ok(())
        })
        .await?;

        self.uploader.upload(&alert_path, &[recipient]).await?;

        let state_path = self.state_path();
        let state_text = format!("notified_at={}\n", Utc::now().to_rfc3339());
        fsutil::run_blocking(move || Ok(fsutil::atomic_write(&state_path, state_text.as_bytes())?))
            .await?;

        tracing::warn!("Administrator notified of host outage");
        Ok(true)
    }

    /// Forget a pending alert; returns whether one was pending
    pub fn clear_alert_state(&self) -> Result<bool> {
        Ok(fsutil::remove_if_exists(&self.state_path())?)
    }

    /// Re-run stable studies whose description still holds a recipient and a
    /// `pw=` token. Returns the number of studies handed to the coordinator.
    pub async fn sweep_stuck_studies(&self) -> Result<usize> {
        let host = self.coordinator.host();
        let mut retriggered = 0;
        for study_id in host.list_studies().await? {
            let study = match host.get_study(&study_id).await {
                Ok(Some(study)) => study,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(study_id = %study_id, error = %e, "Could not inspect study");
                    continue;
                }
            };
            if !study.is_stable {
                continue;
            }
            let description = study.description();
            if extract_recipients(description).is_empty() || find_passphrase(description).is_none() {
                continue;
            }

            tracing::info!(study_id = %study_id, "Re-running export of unfinished study");
            self.coordinator.handle_stable_study(&study_id).await;
            retriggered += 1;
        }
        Ok(retriggered)
    }

    /// Move published artifacts with ledger records into the queue.
    ///
    /// Returns the number of artifacts moved.
    pub async fn requeue_stranded_artifacts(&self) -> Result<usize> {
        let ledger = self.coordinator.ledger().clone();
        let transfer = self.transfer.clone();
        let extension = self.extension.clone();

        fsutil::run_blocking(move || {
            if !transfer.export_dir().is_dir() {
                return Ok(0);
            }
            let recipients = ledger.load_recipients()?;
            let mut moved = 0;
            for name in list_artifacts(transfer.export_dir(), &extension)? {
                if !recipients.contains_key(&name) {
                    continue;
                }
                match transfer.transfer_by_name(name.as_str()) {
                    Ok(TransferOutcome::Moved { bytes, .. }) => {
                        tracing::info!(artifact = %name, bytes = bytes, "Stranded artifact moved to the delivery queue");
                        moved += 1;
                    }
                    Ok(TransferOutcome::AlreadyQueued) => {}
                    Err(e) => tracing::warn!(artifact = %name, error = %e, "Could not requeue artifact"),
                }
            }
            Ok(moved)
        })
        .await
    }

    /// Health check, alerting, and a recovery sweep when due
    pub async fn run_once(&mut self) -> MonitorReport {
        let mut report = MonitorReport {
            healthy: self.check_health().await,
            ..MonitorReport::default()
        };

        if !report.healthy {
            tracing::error!("Host imaging server is not reachable");
            match self.notify_admin(OUTAGE_MESSAGE).await {
                Ok(sent) => report.alert_sent = sent,
                Err(e) => log_error_with_context!(e, "Failed to notify administrator"),
            }
            return report;
        }

        match self.clear_alert_state() {
            Ok(true) => {
                tracing::info!("Host imaging server is healthy again; alert state cleared");
                report.recovered = true;
            }
            Ok(false) => tracing::debug!("Host imaging server is running normally"),
            Err(e) => log_error_with_context!(e, "Failed to clear alert state"),
        }

        if report.recovered || !self.swept_once {
            self.swept_once = true;
            if self.sweep_studies {
                match self.sweep_stuck_studies().await {
                    Ok(count) => report.studies_retriggered = count,
                    Err(e) => log_error_with_context!(e, "Study sweep failed"),
                }
            }
            match self.requeue_stranded_artifacts().await {
                Ok(count) => report.artifacts_requeued = count,
                Err(e) => log_error_with_context!(e, "Artifact requeue failed"),
            }
        }
        report
    }

    /// Run cycles every `interval_seconds` until `shutdown` turns true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.interval_seconds);
        tracing::info!(interval_secs = interval.as_secs(), "Health monitor started");

        while !*shutdown.borrow() {
            self.run_once().await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Health monitor stopped");
    }
}
