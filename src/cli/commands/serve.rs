//! Serve command implementation
//!
//! Runs the long-lived service: delivery endpoint, change feed, upload
//! watcher and, when enabled, the health monitor. A shutdown signal stops
//! every loop; exports already running are allowed to finish.

use super::{build_coordinator, process_runner};
use crate::adapters::command::FileSenderUploader;
use crate::adapters::host::HostServer;
use crate::config::load_config;
use crate::core::events::ChangeFeed;
use crate::core::monitor::HealthMonitor;
use crate::core::transfer::QueueTransfer;
use crate::core::watcher::UploadWatcher;
use crate::server::{start_server, AppState};
use clap::Args;
use std::fs;
use std::net::SocketAddr;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the delivery endpoint bind address
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Do not start the health monitor
    #[arg(long)]
    pub no_monitor: bool,
}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };
        if let Some(bind) = self.bind {
            tracing::info!(bind = %bind, "Overriding bind address from CLI");
            config.server.bind_address = bind;
        }
        if self.no_monitor {
            config.monitor.enabled = false;
        }

        let mut dirs = vec![&config.export.export_dir, &config.queue.queue_dir];
        if config.monitor.enabled {
            dirs.push(&config.monitor.state_dir);
        }
        for dir in dirs {
            if let Err(e) = fs::create_dir_all(dir) {
                tracing::error!(dir = %dir.display(), error = %e, "Failed to create directory");
                eprintln!("Failed to create {}: {e}", dir.display());
                return Ok(5);
            }
        }

        let runner = process_runner();
        let coordinator = match build_coordinator(&config, runner.clone()) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize adapters");
                eprintln!("Failed to initialize: {e}");
                return Ok(2);
            }
        };

        if let Err(e) = coordinator.host().system_info().await {
            tracing::warn!(error = %e, "Host server is not reachable yet");
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut loops = JoinSet::new();

        let feed = ChangeFeed::from_config(&config, coordinator.clone());
        loops.spawn(feed.run(stop_rx.clone()));

        let watcher = UploadWatcher::from_config(
            &config,
            coordinator.ledger().clone(),
            FileSenderUploader::new(config.uploader.clone(), runner.clone()),
        );
        loops.spawn(watcher.run(stop_rx.clone()));

        if config.monitor.enabled {
            let monitor = HealthMonitor::from_config(
                &config,
                coordinator.clone(),
                FileSenderUploader::new(config.uploader.clone(), runner.clone()),
            );
            loops.spawn(monitor.run(stop_rx.clone()));
        }

        let state = AppState::new(QueueTransfer::new(
            &config.export.export_dir,
            &config.queue.queue_dir,
        ));
        let mut server = tokio::spawn(start_server(
            config.server.bind_address,
            state,
            stop_rx.clone(),
        ));

        tracing::info!(
            bind = %config.server.bind_address,
            export_dir = %config.export.export_dir.display(),
            queue_dir = %config.queue.queue_dir.display(),
            monitor = config.monitor.enabled,
            "Courier service running"
        );

        let server_result = tokio::select! {
            _ = wait_for_shutdown(shutdown_signal) => {
                let _ = stop_tx.send(true);
                server.await
            }
            finished = &mut server => {
                let _ = stop_tx.send(true);
                finished
            }
        };

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Service loop panicked");
            }
        }

        match server_result {
            Ok(Ok(())) => {
                tracing::info!("Courier service stopped");
                Ok(0)
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Delivery endpoint failed");
                eprintln!("Delivery endpoint failed: {e}");
                Ok(5)
            }
            Err(e) => {
                tracing::error!(error = %e, "Delivery endpoint task panicked");
                Ok(5)
            }
        }
    }
}

/// Resolves once the signal channel reports `true`
pub(crate) async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
