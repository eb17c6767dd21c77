//! Result of one export invocation

use crate::core::encoder::EncodedArtifact;
use crate::domain::{ExportState, StudyId};
use std::fmt;
use std::time::Duration;

/// Why an export ended in `Idle` without doing anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another export for the same study is running
    AlreadyActive,
    /// The host no longer knows the study
    NotFound,
    /// The host has not marked the study stable yet
    NotStable,
    /// The description names no recipient
    NoRecipients,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::AlreadyActive => "export already in progress",
            SkipReason::NotFound => "study not found",
            SkipReason::NotStable => "study not stable",
            SkipReason::NoRecipients => "no recipient in description",
        };
        f.write_str(text)
    }
}

/// What an export invocation did
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub study_id: StudyId,

    /// Last state reached
    pub state: ExportState,

    /// Set when the export ended in `Idle`
    pub skipped: Option<SkipReason>,

    pub artifact: Option<EncodedArtifact>,

    /// Recipients in order of first appearance
    pub recipients: Vec<String>,

    /// Whether the passphrase came from the configured default
    pub default_passphrase: bool,

    pub deliveries_ok: usize,
    pub deliveries_failed: usize,

    pub duration: Duration,
}

impl ExportOutcome {
    pub fn skipped(study_id: StudyId, reason: SkipReason) -> Self {
        Self {
            study_id,
            state: ExportState::Idle,
            skipped: Some(reason),
            artifact: None,
            recipients: Vec::new(),
            default_passphrase: false,
            deliveries_ok: 0,
            deliveries_failed: 0,
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// True when every delivery request was accepted
    pub fn fully_delivered(&self) -> bool {
        self.state == ExportState::Delivered && self.deliveries_failed == 0
    }

    /// Log a one-line summary
    pub fn log_summary(&self) {
        match (&self.skipped, &self.artifact) {
            (Some(reason), _) => tracing::debug!(
                study_id = %self.study_id,
                reason = %reason,
                "Study not exported"
            ),
            (None, Some(artifact)) => tracing::info!(
                study_id = %self.study_id,
                artifact = %artifact.name,
                state = %self.state,
                recipients = self.recipients.len(),
                deliveries_ok = self.deliveries_ok,
                deliveries_failed = self.deliveries_failed,
                duration_ms = self.duration.as_millis() as u64,
                "Export finished"
            ),
            (None, None) => tracing::info!(
                study_id = %self.study_id,
                state = %self.state,
                "Export finished without artifact"
            ),
        }
    }
}
