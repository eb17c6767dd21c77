//! Recipient ledger
//!
//! Maps artifact file names to recipient addresses, one JSON object per
//! line (`{"file": "...", "email": "..."}`). The ledger is a set of pairs:
//! an artifact with two recipients has two lines, and an artifact exported
//! twice may have duplicate lines.
//!
//! Every mutation rewrites the whole file through a temp file and an atomic
//! rename, so a crash leaves either the old or the new content on disk.
//! Writers are serialized by an in-process mutex plus an exclusive `flock`
//! on `<ledger>.lock`, shared with other courier processes on the same host.

use crate::core::fsutil;
use crate::domain::{ArtifactName, CourierError, PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One `{artifact, recipient}` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub file: ArtifactName,
    pub email: String,
}

/// Append-only recipient ledger backed by a newline-delimited JSON file
#[derive(Debug)]
pub struct MappingLedger {
    path: PathBuf,
    writer: Mutex<()>,
}

/// Exclusive advisory lock on `<ledger>.lock`, released on drop.
///
/// The lock file itself is never removed. The kernel drops the lock when the
/// holding process exits, so a crashed writer cannot block later ones.
struct LedgerLock {
    file: File,
}

impl LedgerLock {
    fn acquire(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "Failed to release ledger lock");
        }
    }
}

fn write_failed(context: &str, err: impl std::fmt::Display) -> CourierError {
    PipelineError::LedgerWriteFailed(format!("{context}: {err}")).into()
}

impl MappingLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Raw ledger text; empty when the file does not exist yet
    fn read_text(&self) -> io::Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    /// Run `rewrite` over the current lines and atomically store the result.
    ///
    /// `rewrite` returns `None` to leave the file untouched.
    fn rewrite<F>(&self, rewrite: F) -> Result<()>
    where
        F: FnOnce(Vec<String>) -> Result<Option<Vec<String>>>,
    {
        let _guard = self
            .writer
            .lock()
            .map_err(|_| write_failed("ledger mutex", "poisoned"))?;
        let _lock =
            LedgerLock::acquire(&self.lock_path()).map_err(|e| write_failed("acquire lock", e))?;

        let existing = self
            .read_text()
            .map_err(|e| write_failed("read ledger", e))?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();

        let Some(lines) = rewrite(existing)? else {
            return Ok(());
        };
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }

        fsutil::atomic_write(&self.path, content.as_bytes())
            .map_err(|e| write_failed("replace ledger", e))
    }

    /// Add one record per recipient for `artifact`.
    ///
    /// Existing lines are kept verbatim.
    pub fn append(&self, artifact: &ArtifactName, recipients: &[String]) -> Result<()> {
        if recipients.is_empty() {
            return Ok(());
        }

        let new_lines = recipients
            .iter()
            .map(|email| {
                serde_json::to_string(&LedgerRecord {
                    file: artifact.clone(),
                    email: email.clone(),
                })
                .map_err(|e| write_failed("serialize record", e))
            })
            .collect::<Result<Vec<_>>>()?;

        self.rewrite(|mut lines| {
            lines.extend(new_lines);
            Ok(Some(lines))
        })?;

        tracing::debug!(
            artifact = %artifact,
            recipients = recipients.len(),
            ledger = %self.path.display(),
            "Ledger records appended"
        );
        Ok(())
    }

    /// Drop every record whose artifact satisfies `delivered`.
    ///
    /// Malformed lines are kept. Returns the number of lines removed; the
    /// file is left untouched when nothing matches.
    pub fn prune<F>(&self, delivered: F) -> Result<usize>
    where
        F: Fn(&ArtifactName) -> bool,
    {
        let mut removed = 0;
        let path = &self.path;
        self.rewrite(|lines| {
            let before = lines.len();
            let kept: Vec<String> = lines
                .into_iter()
                .filter(|line| match serde_json::from_str::<LedgerRecord>(line) {
                    Ok(record) => !delivered(&record.file),
                    Err(e) => {
                        tracing::warn!(
                            ledger = %path.display(),
                            error = %e,
                            "Keeping malformed ledger line"
                        );
                        true
                    }
                })
                .collect();
            removed = before - kept.len();
            Ok((removed > 0).then_some(kept))
        })?;

        if removed > 0 {
            tracing::info!(removed = removed, "Ledger pruned");
        }
        Ok(removed)
    }

    /// Every well-formed record in file order; malformed lines are skipped
    pub fn records(&self) -> Result<Vec<LedgerRecord>> {
        let text = self.read_text()?;
        let mut records = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    ledger = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping malformed ledger line"
                ),
            }
        }
        Ok(records)
    }

    /// Artifact name to the recipient on its most recent line
    pub fn load_all(&self) -> Result<HashMap<ArtifactName, String>> {
        Ok(self
            .records()?
            .into_iter()
            .map(|record| (record.file, record.email))
            .collect())
    }

    /// Artifact name to all of its distinct recipients, in first-seen order
    pub fn load_recipients(&self) -> Result<HashMap<ArtifactName, Vec<String>>> {
        let mut map: HashMap<ArtifactName, Vec<String>> = HashMap::new();
        for record in self.records()? {
            let recipients = map.entry(record.file).or_default();
            if !recipients.contains(&record.email) {
                recipients.push(record.email);
            }
        }
        Ok(map)
    }
}
