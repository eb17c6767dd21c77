//! Verified relocation of artifacts from the export area into the queue
//!
//! The copy lands in a temp file inside the queue directory, is fsynced and
//! size-checked, and only then renamed to its final name. The source is
//! removed last, and failure to remove it does not fail the transfer.

use crate::core::fsutil;
use crate::domain::{ArtifactName, TransferError};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// What a successful transfer did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The artifact was copied into the queue
    Moved {
        bytes: u64,
        /// `false` when the export-area copy could not be deleted
        source_removed: bool,
    },
    /// The artifact was already in the queue and gone from the export area
    AlreadyQueued,
}

/// Moves artifacts between the export area and the delivery queue
#[derive(Debug, Clone)]
pub struct QueueTransfer {
    export_dir: PathBuf,
    queue_dir: PathBuf,
}

fn failed(context: &str, path: &Path, err: io::Error) -> TransferError {
    TransferError::Failed(format!("{context} {}: {err}", path.display()))
}

impl QueueTransfer {
    pub fn new(export_dir: impl Into<PathBuf>, queue_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            queue_dir: queue_dir.into(),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn queue_dir(&self) -> &Path {
        &self.queue_dir
    }

    /// Copy `source` to `dest` durably, verify the size, then remove `source`.
    ///
    /// On error the source is untouched and no temp file remains, so the
    /// call can be retried as is.
    pub fn move_artifact(
        &self,
        source: &Path,
        dest: &Path,
    ) -> Result<TransferOutcome, TransferError> {
        let source_len = match fs::metadata(source) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Err(TransferError::SourceMissing(source.display().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TransferError::SourceMissing(source.display().to_string()))
            }
            Err(e) => return Err(failed("stat", source, e)),
        };

        let dest_dir = dest.parent().unwrap_or(Path::new("."));
        if let Some(dest_name) = dest.file_name().and_then(|n| n.to_str()) {
            match fsutil::remove_stale_temps(dest_dir, dest_name) {
                Ok(0) => {}
                Ok(count) => tracing::info!(
                    artifact = dest_name,
                    removed = count,
                    "Removed temp files of an interrupted transfer"
                ),
                Err(e) => tracing::warn!(
                    artifact = dest_name,
                    error = %e,
                    "Could not scan for stale temp files"
                ),
            }
        }

        let mut tmp = fsutil::temp_file_for(dest).map_err(|e| failed("create temp in", dest_dir, e))?;
        let mut input = File::open(source).map_err(|e| failed("open", source, e))?;
        io::copy(&mut input, tmp.as_file_mut()).map_err(|e| failed("copy", source, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| failed("fsync", tmp.path(), e))?;

        let copied_len = tmp
            .as_file()
            .metadata()
            .map_err(|e| failed("stat", tmp.path(), e))?
            .len();
        if copied_len != source_len {
            // dropping `tmp` deletes it
            return Err(TransferError::Failed(format!(
                "size mismatch for {}: source {source_len} bytes, copy {copied_len} bytes",
                source.display()
            )));
        }

        fsutil::persist_durable(tmp, dest).map_err(|e| failed("publish", dest, e))?;

        let source_removed = match fs::remove_file(source) {
            Ok(()) => {
                if let Some(parent) = source.parent() {
                    if let Err(e) = fsutil::fsync_dir(parent) {
                        tracing::debug!(error = %e, "fsync of export directory failed");
                    }
                }
                true
            }
            Err(e) => {
                tracing::warn!(
                    source = %source.display(),
                    dest = %dest.display(),
                    error = %e,
                    "Artifact relocated but the export copy could not be removed; duplicate left for cleanup"
                );
                false
            }
        };

        Ok(TransferOutcome::Moved {
            bytes: copied_len,
            source_removed,
        })
    }

    /// Move the artifact called `name` from the export area into the queue.
    ///
    /// A name already present in the queue and absent from the export area
    /// is reported as [`TransferOutcome::AlreadyQueued`].
    pub fn transfer_by_name(&self, name: &str) -> Result<TransferOutcome, TransferError> {
        let artifact = ArtifactName::new(name.trim()).map_err(TransferError::InvalidName)?;
        let source = self.export_dir.join(artifact.as_str());
        let dest = self.queue_dir.join(artifact.as_str());

        match self.move_artifact(&source, &dest) {
            Err(TransferError::SourceMissing(_)) if dest.is_file() => {
                tracing::debug!(artifact = %artifact, "Artifact already in the delivery queue");
                Ok(TransferOutcome::AlreadyQueued)
            }
            Err(TransferError::SourceMissing(_)) => {
                Err(TransferError::SourceMissing(artifact.to_string()))
            }
            other => other,
        }
    }
}
