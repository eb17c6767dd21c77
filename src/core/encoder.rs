//! Artifact creation
//!
//! Rewrites the study description on the host, downloads the archive,
//! encrypts it with the external compressor and publishes the result into
//! the export area with an atomic rename.

use crate::adapters::command::ArchiveCompressor;
use crate::adapters::host::HostServer;
use crate::core::fsutil;
use crate::core::sanitize::sanitize;
use crate::domain::{
    ArtifactName, CourierError, ExportState, PipelineError, Result, StudyId, StudyMetadata,
};
use crate::log_state_transition;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, TempPath};

/// Longest description component kept in an artifact name
const MAX_DESCRIPTION_CHARS: usize = 64;

/// Name component used when a part sanitizes to nothing
const EMPTY_COMPONENT: &str = "Unknown";

/// Suffixed names tried before giving up on a name collision
const MAX_NAME_ATTEMPTS: u32 = 100;

/// A published artifact in the export area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedArtifact {
    pub name: ArtifactName,
    pub path: PathBuf,
    pub size: u64,
    /// Hex SHA-256 of the published file
    pub sha256: String,
    /// Id of the study carrying the cleaned description
    pub rewritten_study_id: StudyId,
    /// Id the archive bytes were actually downloaded from
    pub archive_source: StudyId,
}

/// Artifact file name: `<patient>_<date>_<description>_<timestamp>.<ext>`
///
/// Every component is passed through [`sanitize`]. Runs of dots are
/// collapsed and leading dots removed so the name is always a plain,
/// visible file name.
pub fn build_artifact_name(
    patient_id: &str,
    study_date: &str,
    cleaned_description: &str,
    created_at: DateTime<Utc>,
    extension: &str,
) -> Result<ArtifactName> {
    let description: String = sanitize(cleaned_description)
        .chars()
        .take(MAX_DESCRIPTION_CHARS)
        .collect();
    let base = [
        sanitize(patient_id),
        sanitize(study_date),
        description,
        created_at.format("%Y%m%dT%H%M%S%3f").to_string(),
    ]
    .into_iter()
    .map(|part| {
        let part = collapse_dots(&part);
        let part = part.trim_start_matches('.');
        if part.is_empty() {
            EMPTY_COMPONENT.to_string()
        } else {
            part.to_string()
        }
    })
    .collect::<Vec<_>>()
    .join("_");

    ArtifactName::new(format!("{base}.{extension}")).map_err(CourierError::Validation)
}

fn collapse_dots(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '.' && out.ends_with('.') {
            continue;
        }
        out.push(c);
    }
    out
}

fn encryption_failed(context: &str, err: impl std::fmt::Display) -> CourierError {
    PipelineError::EncryptionFailed(format!("{context}: {err}")).into()
}

/// Turns a stable study into an encrypted artifact
pub struct ArtifactEncoder {
    host: Arc<dyn HostServer>,
    compressor: ArchiveCompressor,
    export_dir: PathBuf,
    extension: String,
    settle_delay: Duration,
    visibility_poll_attempts: u32,
}

impl ArtifactEncoder {
    pub fn new(
        host: Arc<dyn HostServer>,
        compressor: ArchiveCompressor,
        export_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            host,
            compressor,
            export_dir: export_dir.into(),
            extension: extension.into(),
            settle_delay: Duration::from_millis(1000),
            visibility_poll_attempts: 5,
        }
    }

    /// Wait used after a metadata rewrite, and between visibility polls
    pub fn with_settle(mut self, settle_delay: Duration, visibility_poll_attempts: u32) -> Self {
        self.settle_delay = settle_delay;
        self.visibility_poll_attempts = visibility_poll_attempts;
        self
    }

    /// Run every step for `meta` and publish the artifact.
    ///
    /// `cleaned` is the description with recipients and passphrase removed.
    /// `progress` is advanced after each completed step, so on error it names
    /// the last state reached.
    pub async fn encode(
        &self,
        meta: &StudyMetadata,
        cleaned: &str,
        passphrase: &str,
        progress: &mut ExportState,
    ) -> Result<EncodedArtifact> {
        let study_id = &meta.study_id;

        let rewritten = self.clean_metadata(study_id, &sanitize(cleaned)).await?;
        let claimed = *progress;
        log_state_transition!(study_id, claimed, ExportState::MetadataCleaned);
        *progress = ExportState::MetadataCleaned;

        self.wait_until_visible(&rewritten).await;

        let (bytes, archive_source) = self.fetch_archive(&rewritten, study_id).await?;
        log_state_transition!(study_id, ExportState::MetadataCleaned, ExportState::Archived);
        *progress = ExportState::Archived;

        let name = build_artifact_name(
            &meta.patient_id,
            &meta.study_date,
            cleaned,
            Utc::now(),
            &self.extension,
        )?;
        let (name, path, size, sha256) = self.publish(&name, bytes, passphrase).await?;
        log_state_transition!(study_id, ExportState::Archived, ExportState::Encrypted);
        *progress = ExportState::Encrypted;

        tracing::info!(
            study_id = %study_id,
            artifact = %name,
            size_bytes = size,
            sha256 = %sha256,
            "Artifact published"
        );

        Ok(EncodedArtifact {
            name,
            path,
            size,
            sha256,
            rewritten_study_id: rewritten,
            archive_source,
        })
    }

    /// Replace the description on the host; returns the id of the new study
    pub async fn clean_metadata(&self, study_id: &StudyId, description: &str) -> Result<StudyId> {
        self.host
            .modify_study_description(study_id, description)
            .await
            .map_err(|e| PipelineError::MetadataCleanupFailed(e.to_string()).into())
    }

    /// Poll for the rewritten study; fall back to one fixed settle delay
    async fn wait_until_visible(&self, study_id: &StudyId) {
        for attempt in 1..=self.visibility_poll_attempts {
            match self.host.study_exists(study_id).await {
                Ok(true) => {
                    tracing::debug!(study_id = %study_id, attempt = attempt, "Rewritten study visible");
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(study_id = %study_id, error = %e, "Visibility check failed")
                }
            }
            tokio::time::sleep(self.settle_delay).await;
        }

        if self.visibility_poll_attempts > 0 {
            tracing::warn!(
                study_id = %study_id,
                attempts = self.visibility_poll_attempts,
                "Rewritten study not confirmed visible; continuing after settle delay"
            );
        }
        tokio::time::sleep(self.settle_delay).await;
    }

    /// Archive bytes of `rewritten`, falling back once to `original`
    pub async fn fetch_archive(
        &self,
        rewritten: &StudyId,
        original: &StudyId,
    ) -> Result<(Vec<u8>, StudyId)> {
        match self.host.download_archive(rewritten).await {
            Ok(bytes) if !bytes.is_empty() => return Ok((bytes, rewritten.clone())),
            Ok(_) => tracing::warn!(study_id = %rewritten, "Empty archive for rewritten study"),
            Err(e) => {
                tracing::warn!(study_id = %rewritten, error = %e, "Archive download failed")
            }
        }

        if rewritten != original {
            match self.host.download_archive(original).await {
                Ok(bytes) if !bytes.is_empty() => {
                    tracing::info!(study_id = %original, "Using archive of the original study");
                    return Ok((bytes, original.clone()));
                }
                Ok(_) => tracing::warn!(study_id = %original, "Empty archive for original study"),
                Err(e) => {
                    tracing::warn!(study_id = %original, error = %e, "Archive download failed")
                }
            }
        }

        Err(PipelineError::ArchiveUnavailable(format!(
            "no archive bytes for {rewritten} or {original}"
        ))
        .into())
    }

    /// Write `bytes` privately, encrypt them and move the result into place.
    ///
    /// Everything is staged in a hidden temp directory inside the export
    /// area, so a failed run leaves nothing under the final name. An existing
    /// artifact is never replaced; a taken name gets a numeric suffix.
    async fn publish(
        &self,
        name: &ArtifactName,
        bytes: Vec<u8>,
        passphrase: &str,
    ) -> Result<(ArtifactName, PathBuf, u64, String)> {
        let staging = tempfile::Builder::new()
            .prefix(&fsutil::temp_prefix(name.as_str()))
            .suffix(fsutil::TEMP_SUFFIX)
            .tempdir_in(&self.export_dir)
            .map_err(|e| encryption_failed("create staging directory", e))?;

        let stem = name
            .as_str()
            .strip_suffix(&format!(".{}", self.extension))
            .unwrap_or(name.as_str());
        let source = staging.path().join(format!("{stem}_dicom.zip"));
        let encrypted = staging.path().join(name.as_str());

        let source_path = source.clone();
        tokio::task::spawn_blocking(move || write_synced(&source_path, &bytes))
            .await
            .map_err(|e| encryption_failed("archive writer", e))?
            .map_err(|e| encryption_failed("write archive", e))?;

        self.compressor.compress(&source, &encrypted, passphrase).await?;

        let (size, sha256) = tokio::task::spawn_blocking({
            let encrypted = encrypted.clone();
            move || checksum_synced(&encrypted)
        })
        .await
        .map_err(|e| encryption_failed("checksum", e))?
        .map_err(|e| encryption_failed("checksum artifact", e))?;
        if size == 0 {
            return Err(encryption_failed("publish artifact", "compressor produced an empty file"));
        }

        let export_dir = self.export_dir.clone();
        let base = name.clone();
        let extension = self.extension.clone();
        let published = tokio::task::spawn_blocking(move || {
            persist_unique(encrypted, &export_dir, &base, &extension)
        })
        .await
        .map_err(|e| encryption_failed("publisher", e))??;

        // the artifact is visible from here on; cleanup problems are not fatal
        let export_dir = self.export_dir.clone();
        let cleanup = tokio::task::spawn_blocking(move || discard_staging(staging, &export_dir)).await;
        match cleanup {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                artifact = %published,
                error = %e,
                "Staging cleanup failed after publish"
            ),
            Err(e) => tracing::warn!(
                artifact = %published,
                error = %e,
                "Staging cleanup task failed after publish"
            ),
        }

        let path = self.export_dir.join(published.as_str());
        Ok((published, path, size, sha256))
    }

    /// Delete the original study from the host.
    ///
    /// Takes the published artifact so deletion cannot be requested before
    /// one exists.
    pub async fn delete_original(&self, study_id: &StudyId, artifact: &EncodedArtifact) -> Result<()> {
        if !artifact.path.is_file() {
            return Err(CourierError::Validation(format!(
                "refusing to delete {study_id}: artifact {} is missing",
                artifact.path.display()
            )));
        }
        self.host.delete_study(study_id).await
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Size and hex SHA-256 of `path`, after an fsync
fn checksum_synced(path: &Path) -> io::Result<(u64, String)> {
    let mut file = File::open(path)?;
    file.sync_all()?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher)?;
    Ok((size, format!("{:x}", hasher.finalize())))
}

/// `<stem>_<n>.<ext>` for the `n`th name collision
fn suffixed_name(base: &ArtifactName, extension: &str, n: u32) -> Result<ArtifactName> {
    let stem = base
        .as_str()
        .strip_suffix(&format!(".{extension}"))
        .unwrap_or(base.as_str());
    ArtifactName::new(format!("{stem}_{n}.{extension}")).map_err(CourierError::Validation)
}

/// Move `staged` into `export_dir` under `base` or the first free suffixed
/// name, without ever overwriting an existing file.
fn persist_unique(
    staged: PathBuf,
    export_dir: &Path,
    base: &ArtifactName,
    extension: &str,
) -> Result<ArtifactName> {
    let mut pending = TempPath::from_path(staged);
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = if attempt == 0 {
            base.clone()
        } else {
            suffixed_name(base, extension, attempt)?
        };
        match pending.persist_noclobber(export_dir.join(candidate.as_str())) {
            Ok(()) => {
                if attempt > 0 {
                    tracing::warn!(
                        requested = %base,
                        artifact = %candidate,
                        "Artifact name already taken; published under a suffixed name"
                    );
                }
                if let Err(e) = fsutil::fsync_dir(export_dir) {
                    tracing::warn!(error = %e, "Export directory sync failed after publish");
                }
                return Ok(candidate);
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => pending = e.path,
            Err(e) => return Err(encryption_failed("publish artifact", e.error)),
        }
    }
    Err(encryption_failed(
        "publish artifact",
        format!("no free name for {base} after {MAX_NAME_ATTEMPTS} attempts"),
    ))
}

/// Remove the staging directory and sync the export area
fn discard_staging(staging: TempDir, export_dir: &Path) -> io::Result<()> {
    staging.close()?;
    fsutil::fsync_dir(export_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::command::testing::{exit, ScriptedRunner};
    use crate::adapters::command::{CommandOutput, CommandSpec};
    use crate::testing::FakeHost;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 10, 15, 0).unwrap()
    }

    /// Runner whose fake compressor writes its output file before exiting
    fn compressor_writing_output(
        runner_outputs: Vec<CommandOutput>,
    ) -> (Arc<ScriptedRunner>, ArchiveCompressor) {
        let runner = Arc::new(
            ScriptedRunner::with_outputs(runner_outputs).with_hook(Box::new(
                |spec: &CommandSpec| {
                    fs::write(&spec.args[5], b"encrypted-zip").unwrap();
                },
            )),
        );
        (runner.clone(), ArchiveCompressor::new("7z", runner))
    }

    fn meta(id: &str, description: &str) -> StudyMetadata {
        StudyMetadata::new(
            StudyId::new(id).unwrap(),
            description,
            Some("P001".to_string()),
            Some("20240101".to_string()),
            true,
        )
    }

    #[test]
    fn test_build_artifact_name() {
        let name = build_artifact_name("DOE^JOHN", "20240101", "CT Head", ts(), "zip").unwrap();
        assert_eq!(name.as_str(), "DOE_JOHN_20240101_CT_Head_20240102T101500000.zip");
    }

    #[test]
    fn test_build_artifact_name_neutralizes_dots() {
        let name = build_artifact_name("..", "nodate", "a..b/../c", ts(), "zip").unwrap();
        assert_eq!(name.as_str(), "Unknown_nodate_a.b-.-c_20240102T101500000.zip");
    }

    #[test]
    fn test_build_artifact_name_empty_description() {
        let name = build_artifact_name("P1", "nodate", "", ts(), "zip").unwrap();
        assert_eq!(name.as_str(), "P1_nodate_Unknown_20240102T101500000.zip");
    }

    #[test]
    fn test_build_artifact_name_truncates_description() {
        let long = "x".repeat(200);
        let name = build_artifact_name("P1", "d", &long, ts(), "zip").unwrap();
        assert!(name.as_str().len() < 100);
    }

    #[tokio::test]
    async fn test_encode_publishes_artifact() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::new());
        host.add_study("s1", "CT Head alice@example.com pw=secret42", true, b"dicom-bytes");
        let (runner, compressor) = compressor_writing_output(vec![exit(0)]);
        let encoder = ArtifactEncoder::new(host.clone(), compressor, dir.path(), "zip")
            .with_settle(Duration::from_millis(1), 2);

        let artifact = encoder
            .encode(
                &meta("s1", "CT Head alice@example.com pw=secret42"),
                "CT Head",
                "secret42",
                &mut ExportState::Claimed,
            )
            .await
            .unwrap();

        assert!(artifact.path.is_file());
        assert!(artifact.name.as_str().starts_with("P001_20240101_CT_Head_"));
        assert_eq!(fs::read(&artifact.path).unwrap(), b"encrypted-zip");
        assert_eq!(artifact.size, 13);
        assert_eq!(artifact.sha256.len(), 64);
        assert_eq!(host.description_of(artifact.rewritten_study_id.as_str()).as_deref(), Some("CT_Head"));

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].args.contains(&"-psecret42".to_string()));

        // only the artifact remains in the export area
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_archive_falls_back_to_original() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::new());
        host.add_study("s1", "CT", true, b"original-bytes");
        host.set_rewritten_archive_empty(true);
        let (_runner, compressor) = compressor_writing_output(vec![exit(0)]);
        let encoder = ArtifactEncoder::new(host.clone(), compressor, dir.path(), "zip")
            .with_settle(Duration::from_millis(1), 0);

        let artifact = encoder
            .encode(&meta("s1", "CT"), "CT", "pw", &mut ExportState::Claimed)
            .await
            .unwrap();
        assert_eq!(artifact.archive_source.as_str(), "s1");
    }

    #[tokio::test]
    async fn test_archive_unavailable() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::new());
        host.add_study("s1", "CT", true, b"");
        let (runner, compressor) = compressor_writing_output(vec![exit(0)]);
        let encoder = ArtifactEncoder::new(host, compressor, dir.path(), "zip")
            .with_settle(Duration::from_millis(1), 0);

        let mut progress = ExportState::Claimed;
        let err = encoder
            .encode(&meta("s1", "CT"), "CT", "pw", &mut progress)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CourierError::Pipeline(PipelineError::ArchiveUnavailable(_))
        ));
        assert_eq!(progress, ExportState::MetadataCleaned);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_new_id_is_cleanup_failure() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::new());
        host.add_study("s1", "CT", true, b"bytes");
        host.set_modify_fails(true);
        let (_runner, compressor) = compressor_writing_output(vec![exit(0)]);
        let encoder = ArtifactEncoder::new(host, compressor, dir.path(), "zip");

        let mut progress = ExportState::Claimed;
        let err = encoder
            .encode(&meta("s1", "CT"), "CT", "pw", &mut progress)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CourierError::Pipeline(PipelineError::MetadataCleanupFailed(_))
        ));
        assert_eq!(progress, ExportState::Claimed);
    }

    #[tokio::test]
    async fn test_compressor_failure_leaves_no_files() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::new());
        host.add_study("s1", "CT", true, b"bytes");
        // the hook writes a partial output before the tool reports failure
        let (_runner, compressor) = compressor_writing_output(vec![exit(2)]);
        let encoder = ArtifactEncoder::new(host, compressor, dir.path(), "zip")
            .with_settle(Duration::from_millis(1), 0);

        let mut progress = ExportState::Claimed;
        let err = encoder
            .encode(&meta("s1", "CT"), "CT", "pw", &mut progress)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CourierError::Pipeline(PipelineError::EncryptionFailed(_))
        ));
        assert_eq!(progress, ExportState::Archived);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_delete_original_requires_artifact() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::new());
        host.add_study("s1", "CT", true, b"bytes");
        let (_runner, compressor) = compressor_writing_output(vec![exit(0)]);
        let encoder = ArtifactEncoder::new(host.clone(), compressor, dir.path(), "zip");

        let ghost = EncodedArtifact {
            name: ArtifactName::new("ghost.zip").unwrap(),
            path: dir.path().join("ghost.zip"),
            size: 0,
            sha256: String::new(),
            rewritten_study_id: StudyId::new("s2").unwrap(),
            archive_source: StudyId::new("s2").unwrap(),
        };
        let id = StudyId::new("s1").unwrap();
        assert!(encoder.delete_original(&id, &ghost).await.is_err());
        assert!(host.has_study("s1"));
    }

    #[tokio::test]
    async fn test_publish_never_replaces_an_existing_artifact() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::new());
        // the fake compressor copies its input so each artifact keeps its own bytes
        let runner = Arc::new(ScriptedRunner::with_outputs(vec![exit(0), exit(0), exit(0)]).with_hook(
            Box::new(|spec: &CommandSpec| {
                fs::copy(&spec.args[6], &spec.args[5]).unwrap();
            }),
        ));
        let encoder = ArtifactEncoder::new(
            host,
            ArchiveCompressor::new("7z", runner),
            dir.path(),
            "zip",
        );
        let name = build_artifact_name("P001", "20240101", "CT", ts(), "zip").unwrap();

        let (first, first_path, _, _) = encoder
            .publish(&name, b"study-one".to_vec(), "pw")
            .await
            .unwrap();
        let (second, second_path, _, _) = encoder
            .publish(&name, b"study-two".to_vec(), "pw")
            .await
            .unwrap();
        let (third, _, _, _) = encoder
            .publish(&name, b"study-three".to_vec(), "pw")
            .await
            .unwrap();

        assert_eq!(first, name);
        assert_eq!(second.as_str(), "P001_20240101_CT_20240102T101500000_1.zip");
        assert_eq!(third.as_str(), "P001_20240101_CT_20240102T101500000_2.zip");
        assert_eq!(fs::read(first_path).unwrap(), b"study-one");
        assert_eq!(fs::read(second_path).unwrap(), b"study-two");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_staging_cleanup_failure_leaves_published_artifact() {
        let dir = TempDir::new().unwrap();
        let staging = tempfile::Builder::new()
            .prefix(".a.zip")
            .tempdir_in(dir.path())
            .unwrap();
        let staged = staging.path().join("a.zip");
        fs::write(&staged, b"encrypted-zip").unwrap();
        let name = ArtifactName::new("a.zip").unwrap();

        let published = persist_unique(staged, dir.path(), &name, "zip").unwrap();
        fs::remove_dir_all(staging.path()).unwrap();

        assert!(discard_staging(staging, dir.path()).is_err());
        assert_eq!(published, name);
        assert_eq!(fs::read(dir.path().join("a.zip")).unwrap(), b"encrypted-zip");
    }
}
