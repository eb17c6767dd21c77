//! External system integrations.
//!
//! - [`host`] - imaging server REST API ([`host::HostServer`], [`host::OrthancClient`])
//! - [`command`] - external programs (compressor, uploader) behind [`command::CommandRunner`]
//! - [`delivery`] - client for the local delivery endpoint
//! - [`retry`] - exponential backoff shared by the HTTP clients
//!
//! # Design Pattern
//!
//! Each integration is a trait with one production implementation, so the
//! pipeline can be exercised against in-memory fakes.
//!
//! ```rust,no_run
//! use study_courier::adapters::host::{HostServer, OrthancClient};
//! use study_courier::config::HostConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OrthancClient::new(HostConfig::default())?;
//! let studies = client.list_studies().await?;
//! println!("{} studies", studies.len());
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod delivery;
pub mod host;
pub mod retry;
