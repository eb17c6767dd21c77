//! Export coordinator - per-study state machine
//!
//! One invocation per "study became stable" event. The coordinator claims
//! the study, reads the delivery instructions out of its description, runs
//! the [`ArtifactEncoder`], records the recipients in the ledger and fans
//! out one delivery request per recipient.
//!
//! Failures before the artifact is durable abort the export for that study
//! and are only logged. Delivery failures affect one recipient at a time.

use crate::adapters::command::{ArchiveCompressor, CommandRunner};
use crate::adapters::delivery::{DeliveryClient, DeliveryRequest};
use crate::adapters::host::{HostServer, StudyResource};
use crate::config::{CourierConfig, ExportConfig};
use crate::core::encoder::{ArtifactEncoder, EncodedArtifact};
use crate::core::export::active::ActiveSet;
use crate::core::export::outcome::{ExportOutcome, SkipReason};
use crate::core::fsutil;
use crate::core::ledger::MappingLedger;
use crate::core::sanitize::{extract_recipients, find_passphrase, strip_sensitive_markers};
use crate::domain::{ExportState, Result, StudyId, StudyMetadata};
use crate::{log_delivery_result, log_error_with_context, log_state_transition};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Export policy taken from `[export]`
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub default_passphrase: String,
    pub delete_original: bool,
    pub delivery_pacing: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            default_passphrase: config.default_passphrase.clone(),
            delete_original: config.delete_original,
            delivery_pacing: config.delivery_pacing(),
        }
    }
}

/// Export coordinator
///
/// Built once at startup and shared by every trigger-handling task.
pub struct ExportCoordinator {
    host: Arc<dyn HostServer>,
    encoder: ArtifactEncoder,
    ledger: Arc<MappingLedger>,
    delivery: Arc<dyn DeliveryClient>,
    active: ActiveSet,
    settings: CoordinatorSettings,
}

impl ExportCoordinator {
    pub fn new(
        host: Arc<dyn HostServer>,
        encoder: ArtifactEncoder,
        ledger: Arc<MappingLedger>,
        delivery: Arc<dyn DeliveryClient>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            host,
            encoder,
            ledger,
            delivery,
            active: ActiveSet::new(),
            settings,
        }
    }

    /// Wire a coordinator from the loaded configuration
    pub fn from_config(
        config: &CourierConfig,
        host: Arc<dyn HostServer>,
        runner: Arc<dyn CommandRunner>,
        delivery: Arc<dyn DeliveryClient>,
    ) -> Self {
        let compressor = ArchiveCompressor::new(&config.export.compressor_program, runner);
        let encoder = ArtifactEncoder::new(
            host.clone(),
            compressor,
            &config.export.export_dir,
            &config.queue.artifact_extension,
        )
        .with_settle(config.host.settle_delay(), config.host.visibility_poll_attempts);
        let ledger = Arc::new(MappingLedger::new(config.export.ledger_path()));

        Self::new(
            host,
            encoder,
            ledger,
            delivery,
            CoordinatorSettings::from_config(&config.export),
        )
    }

    pub fn host(&self) -> &Arc<dyn HostServer> {
        &self.host
    }

    pub fn ledger(&self) -> &Arc<MappingLedger> {
        &self.ledger
    }

    pub fn active(&self) -> &ActiveSet {
        &self.active
    }

    /// Event handler entry point.
    ///
    /// Never reports failure to the caller; the host must not redeliver the
    /// event because of an internal error.
    pub async fn handle_stable_study(&self, study_id: &StudyId) {
        match self.export_study(study_id).await {
            Ok(outcome) => outcome.log_summary(),
            Err(e) => tracing::debug!(study_id = %study_id, error = %e, "Stable study handled with error"),
        }
    }

    /// Run the full export for `study_id`.
    ///
    /// Returns an `Idle` outcome when the study is busy, unknown, not stable
    /// or carries no recipient. Errors mean nothing was queued.
    pub async fn export_study(&self, study_id: &StudyId) -> Result<ExportOutcome> {
        let started = Instant::now();
        let Some(_claim) = self.active.try_claim(study_id) else {
            tracing::debug!(study_id = %study_id, "Export already in progress; ignoring trigger");
            return Ok(ExportOutcome::skipped(study_id.clone(), SkipReason::AlreadyActive));
        };

        let mut state = ExportState::Idle;
        match self.run(study_id, &mut state).await {
            Ok(outcome) => Ok(outcome.with_duration(started.elapsed())),
            Err(e) => {
                log_state_transition!(study_id, state, ExportState::Failed);
                log_error_with_context!(&e, "Study export failed");
                Err(e)
            }
        }
    }

    async fn run(&self, study_id: &StudyId, state: &mut ExportState) -> Result<ExportOutcome> {
        let Some(study) = self.host.get_study(study_id).await? else {
            return Ok(ExportOutcome::skipped(study_id.clone(), SkipReason::NotFound));
        };
        if !study.is_stable {
            return Ok(ExportOutcome::skipped(study_id.clone(), SkipReason::NotStable));
        }

        let description = study.description().to_string();
        let recipients = extract_recipients(&description);
        if recipients.is_empty() {
            return Ok(ExportOutcome::skipped(study_id.clone(), SkipReason::NoRecipients));
        }

        log_state_transition!(study_id, ExportState::Idle, ExportState::Claimed);
        *state = ExportState::Claimed;

        let found = find_passphrase(&description);
        let default_passphrase = found.is_none();
        let passphrase = found.unwrap_or_else(|| self.settings.default_passphrase.clone());
        if default_passphrase {
            tracing::warn!(
                study_id = %study_id,
                "No pw= token in description; artifact is protected by the default passphrase"
            );
        }

        let cleaned = strip_sensitive_markers(&description);
        let patient_id = self.lookup_patient(&study).await;
        let meta = StudyMetadata::new(
            study_id.clone(),
            description,
            patient_id,
            study.study_date().map(str::to_string),
            study.is_stable,
        );

        let artifact = self.encoder.encode(&meta, &cleaned, &passphrase, state).await?;

        self.record_recipients(&artifact, &recipients).await?;

        if self.settings.delete_original {
            match self.encoder.delete_original(study_id, &artifact).await {
                Ok(()) => tracing::info!(study_id = %study_id, "Original study deleted from host"),
                Err(e) => tracing::warn!(
                    study_id = %study_id,
                    error = %e,
                    "Could not delete original study; it will stay on the host"
                ),
            }
        }

        log_state_transition!(study_id, ExportState::Encrypted, ExportState::Enqueued);
        *state = ExportState::Enqueued;

        let (deliveries_ok, deliveries_failed) =
            self.fan_out(study_id, &artifact, &recipients).await;

        if deliveries_ok > 0 {
            log_state_transition!(study_id, ExportState::Enqueued, ExportState::Delivered);
            *state = ExportState::Delivered;
        } else {
            tracing::error!(
                study_id = %study_id,
                artifact = %artifact.name,
                "No delivery request accepted; artifact stays in the export area"
            );
        }

        Ok(ExportOutcome {
            study_id: study_id.clone(),
            state: *state,
            skipped: None,
            artifact: Some(artifact),
            recipients,
            default_passphrase,
            deliveries_ok,
            deliveries_failed,
            duration: Duration::ZERO,
        })
    }

    /// `PatientID` of the parent patient, if it can be resolved
    async fn lookup_patient(&self, study: &StudyResource) -> Option<String> {
        let parent = study.parent_patient.as_deref()?;
        match self.host.get_patient(parent).await {
            Ok(Some(patient)) => patient.patient_id().map(str::to_string),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(patient = parent, error = %e, "Patient lookup failed");
                None
            }
        }
    }

    /// Append the ledger records; on failure the artifact is withdrawn
    async fn record_recipients(&self, artifact: &EncodedArtifact, recipients: &[String]) -> Result<()> {
        let ledger = self.ledger.clone();
        let name = artifact.name.clone();
        let owned = recipients.to_vec();
        let appended = fsutil::run_blocking(move || ledger.append(&name, &owned)).await;

        if let Err(e) = appended {
            match fsutil::remove_if_exists(&artifact.path) {
                Ok(_) => tracing::warn!(
                    artifact = %artifact.name,
                    "Artifact removed because its recipients could not be recorded"
                ),
                Err(remove_err) => tracing::error!(
                    artifact = %artifact.name,
                    error = %remove_err,
                    "Artifact without ledger records left in the export area"
                ),
            }
            return Err(e);
        }
        Ok(())
    }

    /// One delivery request per recipient, in order, with pacing in between
    async fn fan_out(
        &self,
        study_id: &StudyId,
        artifact: &EncodedArtifact,
        recipients: &[String],
    ) -> (usize, usize) {
        let mut ok = 0;
        let mut failed = 0;
        for (index, recipient) in recipients.iter().enumerate() {
            if index > 0 && !self.settings.delivery_pacing.is_zero() {
                tokio::time::sleep(self.settings.delivery_pacing).await;
            }
            let request = DeliveryRequest::new(study_id, &artifact.name, recipient);
            let result = self.delivery.request_delivery(&request).await;
            log_delivery_result!(artifact.name, recipient, result);
            match result {
                Ok(()) => ok += 1,
                Err(_) => failed += 1,
            }
        }
        (ok, failed)
    }
}
