// Study Courier - Imaging study export and delivery pipeline
// Copyright (c) 2025 Study Courier Contributors
// Licensed under the MIT License

//! # Study Courier
//!
//! Study Courier turns imaging studies that arrive on an Orthanc-compatible
//! host into encrypted archives and hands them to a file-sharing uploader
//! for the recipients named in the study description.
//!
//! ## Overview
//!
//! A study whose description reads `CT thorax alice@example.org pw=s3cret`
//! becomes `P001_20240101_CT_thorax_<timestamp>.zip`, encrypted with
//! `s3cret`, uploaded for `alice@example.org`. Recipients and passphrase
//! are stripped from the description kept on the host.
//!
//! The pipeline is crash-safe end to end:
//! - Artifacts are published with temp-file-and-rename
//! - The recipient ledger is appended durably before the original is deleted
//! - Queue transfers verify the copy before removing the source
//! - Upload markers make retries and restarts idempotent
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Export state machine, ledger, transfer, watcher, monitor
//! - [`adapters`] - Host REST client, external commands, delivery client
//! - [`server`] - Local delivery endpoint
//! - [`domain`] - Identifiers, study metadata, errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
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
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("courier.toml")?;
//!
//!     let host = Arc::new(OrthancClient::new(config.host.clone())?);
//!     let delivery = Arc::new(HttpDeliveryClient::new(config.export.clone())?);
//!     let coordinator =
//!         ExportCoordinator::from_config(&config, host, Arc::new(ProcessRunner), delivery);
//!
//!     let outcome = coordinator.export_study(&StudyId::new("6b9e19d9-62094390")?).await?;
//!     println!("{} ended in {}", outcome.study_id, outcome.state);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library code returns [`domain::CourierError`]; the CLI maps failures to
//! exit codes.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
pub mod server;

#[cfg(test)]
mod testing;
