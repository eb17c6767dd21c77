//! Study metadata as seen by the export pipeline
//!
//! The host server returns richer records (see `adapters::host::models`);
//! this is the subset the coordinator and encoder actually need, with the
//! fallbacks for missing tags already applied.

use super::ids::StudyId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Patient id used when the parent patient cannot be resolved
pub const UNKNOWN_PATIENT: &str = "Unknown";

/// Study date used when the study carries no date tag
pub const UNKNOWN_DATE: &str = "nodate";

/// Metadata describing one study export candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyMetadata {
    /// Host identifier of the study as triggered
    pub study_id: StudyId,

    /// Free-text study description (may embed recipients and `pw=` token)
    pub description: String,

    /// Patient identifier from the parent patient record
    pub patient_id: String,

    /// Study date tag, usually `YYYYMMDD`
    pub study_date: String,

    /// Whether the host considers the study stable (no more instances expected)
    pub is_stable: bool,
}

impl StudyMetadata {
    /// Create metadata with the standard fallbacks for empty tags
    pub fn new(
        study_id: StudyId,
        description: impl Into<String>,
        patient_id: Option<String>,
        study_date: Option<String>,
        is_stable: bool,
    ) -> Self {
        Self {
            study_id,
            description: description.into(),
            patient_id: patient_id
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_PATIENT.to_string()),
            study_date: study_date
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_DATE.to_string()),
            is_stable,
        }
    }
}

/// Export progress of one study
///
/// `Idle -> Claimed -> MetadataCleaned -> Archived -> Encrypted -> Enqueued
/// -> Delivered`, with `Failed` reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportState {
    Idle,
    Claimed,
    MetadataCleaned,
    Archived,
    Encrypted,
    Enqueued,
    Delivered,
    Failed,
}

impl ExportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExportState::Idle | ExportState::Delivered | ExportState::Failed)
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
