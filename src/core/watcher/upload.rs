//! Delivery queue watcher
//!
//! Each cycle walks the queue directory and hands every unclaimed artifact
//! with known recipients to the external uploader. A failed upload leaves no
//! terminal marker, so the artifact is simply picked up again next cycle.

use crate::adapters::command::FileSenderUploader;
use crate::config::CourierConfig;
use crate::core::fsutil;
use crate::core::ledger::MappingLedger;
use crate::core::watcher::markers::{MarkerState, QueueMarkers};
use crate::domain::{ArtifactName, Result};
use crate::log_error_with_context;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Counters of one watcher cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub uploaded: usize,
    pub failed: usize,
    /// Already claimed or delivered
    pub skipped: usize,
    /// No ledger entry
    pub unmapped: usize,
    pub pruned: usize,
}

/// Artifact file names in `queue_dir` with the given extension, sorted
pub fn list_artifacts(queue_dir: &Path, extension: &str) -> io::Result<Vec<ArtifactName>> {
    let suffix = format!(".{extension}");
    let mut names = Vec::new();
    for entry in fs::read_dir(queue_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if !file_name.ends_with(&suffix) {
            continue;
        }
        if let Ok(name) = ArtifactName::new(file_name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Polls the delivery queue and drives the uploader
pub struct UploadWatcher {
    queue_dir: PathBuf,
    extension: String,
    ledger: Arc<MappingLedger>,
    uploader: FileSenderUploader,
    markers: QueueMarkers,
    poll_interval: Duration,
    stale_claim_after: Duration,
    /// Files already reported as having no recipient
    warned: HashSet<ArtifactName>,
}

impl UploadWatcher {
    pub fn new(
        queue_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        ledger: Arc<MappingLedger>,
        uploader: FileSenderUploader,
        poll_interval: Duration,
    ) -> Self {
        let queue_dir = queue_dir.into();
        Self {
            markers: QueueMarkers::new(&queue_dir),
            queue_dir,
            extension: extension.into(),
            ledger,
            uploader,
            poll_interval,
            stale_claim_after: Duration::from_secs(3600),
            warned: HashSet::new(),
        }
    }

    pub fn from_config(
        config: &CourierConfig,
        ledger: Arc<MappingLedger>,
        uploader: FileSenderUploader,
    ) -> Self {
        Self::new(
            &config.queue.queue_dir,
            &config.queue.artifact_extension,
            ledger,
            uploader,
            config.uploader.poll_interval(),
        )
        // a live attempt is killed after one uploader timeout
        .with_stale_claim_after(config.uploader.timeout() * 2)
    }

    /// Age after which an `.uploading` marker is treated as abandoned
    pub fn with_stale_claim_after(mut self, age: Duration) -> Self {
        self.stale_claim_after = age;
        self
    }

    pub fn markers(&self) -> &QueueMarkers {
        &self.markers
    }

    /// One pass over the queue followed by a ledger prune
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        if !self.queue_dir.is_dir() {
            tracing::warn!(queue_dir = %self.queue_dir.display(), "Delivery queue directory does not exist");
            return Ok(report);
        }

        self.release_stale_claims();

        let ledger = self.ledger.clone();
        let recipients: HashMap<ArtifactName, Vec<String>> =
            fsutil::run_blocking(move || ledger.load_recipients()).await?;

        let queue_dir = self.queue_dir.clone();
        let extension = self.extension.clone();
        let artifacts =
            fsutil::run_blocking(move || Ok(list_artifacts(&queue_dir, &extension)?)).await?;

        for name in artifacts {
            report.scanned += 1;

            if self.markers.state(&name) != MarkerState::Pending {
                report.skipped += 1;
                continue;
            }

            let Some(targets) = recipients.get(&name) else {
                report.unmapped += 1;
                if self.warned.insert(name.clone()) {
                    tracing::warn!(artifact = %name, "No recipient known for queued artifact; ignoring it");
                }
                continue;
            };

            match self.deliver(&name, targets).await {
                Some(true) => report.uploaded += 1,
                Some(false) => report.failed += 1,
                None => report.skipped += 1,
            }
        }

        let markers = self.markers.clone();
        let ledger = self.ledger.clone();
        report.pruned =
            fsutil::run_blocking(move || ledger.prune(|name| markers.is_delivered(name))).await?;

        if report.uploaded > 0 || report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                uploaded = report.uploaded,
                failed = report.failed,
                pruned = report.pruned,
                "Watcher cycle finished"
            );
        }
        Ok(report)
    }

    /// Claim, upload, release. `None` when the artifact could not be claimed.
    async fn deliver(&mut self, name: &ArtifactName, recipients: &[String]) -> Option<bool> {
        let claim = match self.markers.claim(name) {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                tracing::debug!(artifact = %name, "Artifact claimed by another attempt");
                return None;
            }
            Err(e) => {
                tracing::warn!(artifact = %name, error = %e, "Could not create upload marker");
                return None;
            }
        };

        tracing::info!(artifact = %name, recipients = %recipients.join(","), "Uploading artifact");
        let result = self
            .uploader
            .upload(&self.queue_dir.join(name.as_str()), recipients)
            .await;

        if let Err(e) = claim.release() {
            tracing::warn!(artifact = %name, error = %e, "Could not remove upload marker");
        }

        match result {
            Ok(()) => {
                if let Err(e) = self.markers.mark_delivered(name) {
                    tracing::error!(
                        artifact = %name,
                        error = %e,
                        "Upload succeeded but the delivered marker could not be written"
                    );
                }
                self.warned.remove(name);
                tracing::info!(artifact = %name, "Artifact delivered");
                Some(true)
            }
            Err(e) => {
                tracing::warn!(artifact = %name, error = %e, "Upload failed; will retry next cycle");
                Some(false)
            }
        }
    }

    fn release_stale_claims(&self) {
        match self.markers.release_stale_claims(self.stale_claim_after) {
            Ok(released) => {
                for artifact in released {
                    tracing::warn!(artifact = %artifact, "Removed abandoned upload marker");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not scan for abandoned upload markers"),
        }
    }

    /// Run cycles until `shutdown` turns true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            queue_dir = %self.queue_dir.display(),
            interval_secs = self.poll_interval.as_secs(),
            "Upload watcher started"
        );

        while !*shutdown.borrow() {
            if let Err(e) = self.run_cycle().await {
                log_error_with_context!(e, "Upload watcher cycle failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Upload watcher stopped");
    }
}
