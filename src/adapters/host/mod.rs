//! Host imaging server integration
//!
//! - [`HostServer`] - the operations the pipeline needs
//! - [`OrthancClient`] - REST implementation over `reqwest`
//! - [`models`] - wire types of the REST API

pub mod client;
pub mod models;
pub mod traits;

pub use client::OrthancClient;
pub use models::{ChangeBatch, ChangeEntry, PatientResource, StudyResource, SystemInfo};
pub use traits::HostServer;
