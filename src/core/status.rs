//! Pipeline status snapshot
//!
//! Read-only view over the ledger, the export area and the delivery queue,
//! used by `courier status` and by operators looking for stuck artifacts.

use crate::core::ledger::{LedgerRecord, MappingLedger};
use crate::core::watcher::{list_artifacts, MarkerState, QueueMarkers};
use crate::domain::{ArtifactName, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Where an artifact currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactArea {
    Export,
    Queue,
}

/// Delivery progress derived from location and markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactState {
    /// Published, waiting for its delivery request to move it
    AwaitingTransfer,
    Pending,
    Uploading,
    Uploaded,
    /// No ledger record names this artifact
    NoRecipient,
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ArtifactState::AwaitingTransfer => "awaiting-transfer",
            ArtifactState::Pending => "pending",
            ArtifactState::Uploading => "uploading",
            ArtifactState::Uploaded => "uploaded",
            ArtifactState::NoRecipient => "no-recipient",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactStatus {
    pub name: ArtifactName,
    pub area: ArtifactArea,
    pub state: ArtifactState,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    pub ledger_records: Vec<LedgerRecord>,
    pub artifacts: Vec<ArtifactStatus>,
}

impl StatusReport {
    pub fn count(&self, state: ArtifactState) -> usize {
        self.artifacts.iter().filter(|a| a.state == state).count()
    }
}

/// Inspect both areas. Missing directories are reported as empty.
pub fn collect_status(
    export_dir: &Path,
    queue_dir: &Path,
    ledger: &MappingLedger,
    extension: &str,
) -> Result<StatusReport> {
    let ledger_records = ledger.records()?;
    let mut recipients: HashMap<&ArtifactName, Vec<String>> = HashMap::new();
    for record in &ledger_records {
        let entry = recipients.entry(&record.file).or_default();
        if !entry.contains(&record.email) {
            entry.push(record.email.clone());
        }
    }

    let mut artifacts = Vec::new();

    if export_dir.is_dir() {
        for name in list_artifacts(export_dir, extension)? {
            let known = recipients.get(&name).cloned().unwrap_or_default();
            let state = if known.is_empty() {
                ArtifactState::NoRecipient
            } else {
                ArtifactState::AwaitingTransfer
            };
            artifacts.push(ArtifactStatus {
                name,
                area: ArtifactArea::Export,
                state,
                recipients: known,
            });
        }
    }

    if queue_dir.is_dir() {
        let markers = QueueMarkers::new(queue_dir);
        for name in list_artifacts(queue_dir, extension)? {
            let known = recipients.get(&name).cloned().unwrap_or_default();
            let state = match markers.state(&name) {
                MarkerState::Uploaded => ArtifactState::Uploaded,
                MarkerState::Uploading => ArtifactState::Uploading,
                MarkerState::Pending if known.is_empty() => ArtifactState::NoRecipient,
                MarkerState::Pending => ArtifactState::Pending,
            };
            artifacts.push(ArtifactStatus {
                name,
                area: ArtifactArea::Queue,
                state,
                recipients: known,
            });
        }
    }

    Ok(StatusReport {
        ledger_records,
        artifacts,
    })
}
