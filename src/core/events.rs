//! Host change-feed subscriber
//!
//! Polls the host change log and starts one export task per
//! `StableStudy` event. The sequence number of the last consumed change is
//! kept in `<export_dir>/.change_cursor` so a restart resumes where the
//! previous run stopped.

use crate::adapters::host::HostServer;
use crate::config::CourierConfig;
use crate::core::export::ExportCoordinator;
use crate::core::fsutil;
use crate::domain::{CourierError, Result, StudyId};
use crate::log_error_with_context;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Cursor file name inside the export area
pub const CURSOR_FILE: &str = ".change_cursor";

/// Counters of one [`ChangeFeed::poll_once`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub changes: usize,
    pub triggered: usize,
    pub cursor: u64,
}

/// Last consumed change sequence number; 0 when no cursor was stored yet
pub fn load_cursor(path: &Path) -> Result<u64> {
    match fs::read_to_string(path) {
        Ok(text) => match text.trim().parse::<u64>() {
            Ok(seq) => Ok(seq),
            Err(e) => {
                tracing::warn!(
                    cursor = %path.display(),
                    error = %e,
                    "Unreadable change cursor; starting from the beginning"
                );
                Ok(0)
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

pub fn store_cursor(path: &Path, seq: u64) -> Result<()> {
    fsutil::atomic_write(path, format!("{seq}\n").as_bytes()).map_err(CourierError::from)
}

/// Turns host change events into export invocations
pub struct ChangeFeed {
    host: Arc<dyn HostServer>,
    coordinator: Arc<ExportCoordinator>,
    cursor_path: PathBuf,
    batch_size: u32,
    poll_interval: Duration,
    tasks: JoinSet<()>,
}

impl ChangeFeed {
    pub fn new(
        host: Arc<dyn HostServer>,
        coordinator: Arc<ExportCoordinator>,
        cursor_path: impl Into<PathBuf>,
        batch_size: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            host,
            coordinator,
            cursor_path: cursor_path.into(),
            batch_size,
            poll_interval,
            tasks: JoinSet::new(),
        }
    }

    pub fn from_config(config: &CourierConfig, coordinator: Arc<ExportCoordinator>) -> Self {
        Self::new(
            coordinator.host().clone(),
            coordinator,
            config.export.export_dir.join(CURSOR_FILE),
            config.host.change_batch_size,
            Duration::from_secs(config.host.change_poll_interval_seconds),
        )
    }

    pub fn cursor_path(&self) -> &Path {
        &self.cursor_path
    }

    /// Exports started by this feed that have not finished yet
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Consume every pending change, starting an export per stable study.
    ///
    /// The cursor is stored after each batch.
    pub async fn poll_once(&mut self) -> Result<PollReport> {
        let cursor_path = self.cursor_path.clone();
        let mut since = fsutil::run_blocking(move || load_cursor(&cursor_path)).await?;
        let mut report = PollReport {
            cursor: since,
            ..PollReport::default()
        };

        loop {
            let batch = self.host.changes(since, self.batch_size).await?;
            report.changes += batch.changes.len();

            for change in batch.changes.iter().filter(|c| c.is_stable_study()) {
                match StudyId::new(change.id.as_str()) {
                    Ok(study_id) => {
                        tracing::debug!(study_id = %study_id, seq = change.seq, "Study became stable");
                        let coordinator = self.coordinator.clone();
                        self.tasks.spawn(async move {
                            coordinator.handle_stable_study(&study_id).await;
                        });
                        report.triggered += 1;
                    }
                    Err(e) => tracing::warn!(seq = change.seq, error = %e, "Ignoring change with invalid study id"),
                }
            }

            if batch.last > since {
                since = batch.last;
                let cursor_path = self.cursor_path.clone();
                fsutil::run_blocking(move || store_cursor(&cursor_path, since)).await?;
            }
            if batch.done || batch.changes.is_empty() {
                break;
            }
        }

        self.reap_finished();
        report.cursor = since;
        Ok(report)
    }

    fn reap_finished(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Export task panicked");
            }
        }
    }

    /// Wait for every export started so far
    pub async fn wait_idle(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Export task panicked");
            }
        }
    }

    /// Poll until `shutdown` turns true, then let running exports finish
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            cursor = %self.cursor_path.display(),
            interval_secs = self.poll_interval.as_secs(),
            "Change feed started"
        );

        while !*shutdown.borrow() {
            if let Err(e) = self.poll_once().await {
                log_error_with_context!(e, "Change feed poll failed");
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

        if self.in_flight() > 0 {
            tracing::info!(in_flight = self.in_flight(), "Waiting for running exports");
        }
        self.wait_idle().await;
        tracing::info!("Change feed stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::command::testing::ScriptedRunner;
    use crate::adapters::command::{ArchiveCompressor, CommandSpec};
    use crate::core::encoder::ArtifactEncoder;
    use crate::core::export::CoordinatorSettings;
    use crate::core::ledger::MappingLedger;
    use crate::testing::{FakeHost, RecordingDelivery};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        host: Arc<FakeHost>,
        delivery: Arc<RecordingDelivery>,
        feed: ChangeFeed,
    }

    fn fixture(batch_size: u32) -> Fixture {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(FakeHost::new());
        let runner = Arc::new(ScriptedRunner::with_outputs(vec![]).with_hook(Box::new(
            |spec: &CommandSpec| {
                std::fs::write(&spec.args[5], b"encrypted-zip").unwrap();
            },
        )));
        let delivery = Arc::new(RecordingDelivery::default());
        let encoder = ArtifactEncoder::new(
            host.clone(),
            ArchiveCompressor::new("7z", runner),
            dir.path(),
            "zip",
        )
        .with_settle(Duration::from_millis(1), 0);
        let coordinator = Arc::new(ExportCoordinator::new(
            host.clone(),
            encoder,
            Arc::new(MappingLedger::new(dir.path().join("mapping.json"))),
            delivery.clone(),
            CoordinatorSettings {
                default_passphrase: "default123".to_string(),
                delete_original: true,
                delivery_pacing: Duration::ZERO,
            },
        ));
        let feed = ChangeFeed::new(
            host.clone(),
            coordinator,
            dir.path().join(CURSOR_FILE),
            batch_size,
            Duration::from_millis(10),
        );
        Fixture {
            dir,
            host,
            delivery,
            feed,
        }
    }

    #[tokio::test]
    async fn test_stable_studies_trigger_exports() {
        let mut f = fixture(100);
        f.host.add_study("s1", "alice@example.com pw=a", true, b"dicom");
        f.host.add_study("s2", "no address here", true, b"dicom");
        f.host.push_change(1, "StableStudy", "Study", "s1");
        f.host.push_change(2, "NewInstance", "Instance", "i1");
        f.host.push_change(3, "StableStudy", "Study", "s2");

        let report = f.feed.poll_once().await.unwrap();
        f.feed.wait_idle().await;

        assert_eq!(report.changes, 3);
        assert_eq!(report.triggered, 2);
        assert_eq!(report.cursor, 3);
        assert_eq!(load_cursor(f.feed.cursor_path()).unwrap(), 3);
        assert_eq!(f.delivery.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_prevents_replay() {
        let mut f = fixture(100);
        f.host.add_study("s1", "alice@example.com", true, b"dicom");
        f.host.push_change(1, "StableStudy", "Study", "s1");

        f.feed.poll_once().await.unwrap();
        f.feed.wait_idle().await;
        let second = f.feed.poll_once().await.unwrap();

        assert_eq!(second.triggered, 0);
        assert_eq!(second.cursor, 1);
    }

    #[tokio::test]
    async fn test_small_batches_are_followed() {
        let mut f = fixture(1);
        for seq in 1..=4 {
            f.host.push_change(seq, "NewInstance", "Instance", "i");
        }

        let report = f.feed.poll_once().await.unwrap();

        assert_eq!(report.changes, 4);
        assert_eq!(report.cursor, 4);
    }

    #[tokio::test]
    async fn test_host_outage_keeps_cursor() {
        let mut f = fixture(100);
        store_cursor(f.feed.cursor_path(), 7).unwrap();
        f.host.set_down(true);

        assert!(f.feed.poll_once().await.is_err());
        assert_eq!(load_cursor(f.feed.cursor_path()).unwrap(), 7);
    }

    #[test]
    fn test_cursor_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CURSOR_FILE);
        assert_eq!(load_cursor(&path).unwrap(), 0);
        std::fs::write(&path, b"garbage").unwrap();
        assert_eq!(load_cursor(&path).unwrap(), 0);
        store_cursor(&path, 42).unwrap();
        assert_eq!(load_cursor(&path).unwrap(), 42);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let f = fixture(100);
        let _dir = f.dir;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(f.feed.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
