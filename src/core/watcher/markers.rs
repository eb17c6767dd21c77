//! Sidecar marker files in the delivery queue
//!
//! `<name>.uploading` means an upload attempt holds the artifact,
//! `<name>.uploaded` means it was delivered. Neither means it may be claimed.

use crate::core::fsutil;
use crate::domain::ArtifactName;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub const UPLOADING_SUFFIX: &str = ".uploading";
pub const UPLOADED_SUFFIX: &str = ".uploaded";

/// Delivery state of one queued artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    Pending,
    Uploading,
    Uploaded,
}

impl MarkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkerState::Pending => "pending",
            MarkerState::Uploading => "uploading",
            MarkerState::Uploaded => "uploaded",
        }
    }
}

/// Marker files of one queue directory
#[derive(Debug, Clone)]
pub struct QueueMarkers {
    queue_dir: PathBuf,
}

impl QueueMarkers {
    pub fn new(queue_dir: impl Into<PathBuf>) -> Self {
        Self {
            queue_dir: queue_dir.into(),
        }
    }

    pub fn queue_dir(&self) -> &Path {
        &self.queue_dir
    }

    fn marker(&self, name: &ArtifactName, suffix: &str) -> PathBuf {
        self.queue_dir.join(format!("{name}{suffix}"))
    }

    pub fn uploading_path(&self, name: &ArtifactName) -> PathBuf {
        self.marker(name, UPLOADING_SUFFIX)
    }

    pub fn uploaded_path(&self, name: &ArtifactName) -> PathBuf {
        self.marker(name, UPLOADED_SUFFIX)
    }

    /// `Uploaded` wins over `Uploading`
    pub fn state(&self, name: &ArtifactName) -> MarkerState {
        if self.is_delivered(name) {
            MarkerState::Uploaded
        } else if self.uploading_path(name).exists() {
            MarkerState::Uploading
        } else {
            MarkerState::Pending
        }
    }

    pub fn is_delivered(&self, name: &ArtifactName) -> bool {
        self.uploaded_path(name).exists()
    }

    /// Create the `.uploading` marker.
    ///
    /// Returns `None` if another attempt already holds it.
    pub fn claim(&self, name: &ArtifactName) -> io::Result<Option<UploadClaim>> {
        let path = self.uploading_path(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Some(UploadClaim {
                path,
                released: false,
            })),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create the terminal `.uploaded` marker durably
    pub fn mark_delivered(&self, name: &ArtifactName) -> io::Result<()> {
        File::create(self.uploaded_path(name))?.sync_all()?;
        fsutil::fsync_dir(&self.queue_dir)
    }

    /// Remove `.uploading` markers older than `max_age`.
    ///
    /// Such markers belong to an attempt whose process died. Returns the
    /// artifact names that became claimable again.
    pub fn release_stale_claims(&self, max_age: Duration) -> io::Result<Vec<String>> {
        let mut released = Vec::new();
        for entry in fs::read_dir(&self.queue_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(artifact) = file_name.strip_suffix(UPLOADING_SUFFIX) else {
                continue;
            };
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok());
            if age.is_some_and(|age| age > max_age) && fsutil::remove_if_exists(&entry.path())? {
                released.push(artifact.to_string());
            }
        }
        Ok(released)
    }
}

/// Held `.uploading` marker; removed on [`UploadClaim::release`] or drop
#[derive(Debug)]
pub struct UploadClaim {
    path: PathBuf,
    released: bool,
}

impl UploadClaim {
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        fsutil::remove_if_exists(&self.path).map(|_| ())
    }
}

impl Drop for UploadClaim {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = fsutil::remove_if_exists(&self.path) {
                tracing::warn!(marker = %self.path.display(), error = %e, "Failed to remove upload marker");
            }
        }
    }
}
