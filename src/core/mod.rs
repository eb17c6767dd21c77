//! Core pipeline logic.
//!
//! # Modules
//!
//! - [`sanitize`] - Recipient, passphrase and file-name text transforms
//! - [`encoder`] - Metadata rewrite, archive download, encryption, publish
//! - [`ledger`] - Crash-safe artifact to recipient mapping
//! - [`export`] - Per-study state machine and in-flight deduplication
//! - [`transfer`] - Verified move from the export area into the queue
//! - [`watcher`] - Queue polling, upload markers, ledger pruning
//! - [`events`] - Host change feed driving the coordinator
//! - [`monitor`] - Health checks, outage alerts, recovery sweeps
//! - [`status`] - Read-only pipeline snapshot
//! - [`fsutil`] - Temp-file-and-rename helpers shared by the above
//!
//! # Pipeline
//!
//! 1. **Trigger**: the host reports a stable study ([`events::ChangeFeed`])
//! 2. **Claim**: the coordinator registers the study as in flight
//! 3. **Encode**: rewrite the description, fetch and encrypt the archive
//! 4. **Record**: append one ledger line per recipient
//! 5. **Request delivery**: one request per recipient; the endpoint moves
//!    the artifact into the queue
//! 6. **Upload**: the watcher claims the artifact, runs the uploader and
//!    marks it delivered
//! 7. **Prune**: delivered artifacts leave the ledger
//!
//! # Example
//!
//! ```rust,no_run
//! use study_courier::adapters::command::ProcessRunner;
//! use study_courier::adapters::delivery::HttpDeliveryClient;
//! use study_courier::adapters::host::OrthancClient;
//! use study_courier::config::load_config;
//! use study_courier::core::export::ExportCoordinator;
//! use study_courier::domain::StudyId;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("courier.toml")?;
//! let host = Arc::new(OrthancClient::new(config.host.clone())?);
//! let delivery = Arc::new(HttpDeliveryClient::new(config.export.clone())?);
//! let coordinator =
//!     ExportCoordinator::from_config(&config, host, Arc::new(ProcessRunner), delivery);
//!
//! let outcome = coordinator.export_study(&StudyId::new("6b9e19d9-62094390")?).await?;
//! println!("{}: {}", outcome.study_id, outcome.state);
//! # Ok(())
//! # }
//! ```

pub mod encoder;
pub mod events;
pub mod export;
pub mod fsutil;
pub mod ledger;
pub mod monitor;
pub mod sanitize;
pub mod status;
pub mod transfer;
pub mod watcher;
