//! Delivery queue processing
//!
//! The watcher is the only consumer of the queue directory. It talks to the
//! export side exclusively through the filesystem: the ledger file, the
//! artifact files and their marker sidecars.

pub mod markers;
pub mod upload;

pub use markers::{MarkerState, QueueMarkers, UploadClaim, UPLOADED_SUFFIX, UPLOADING_SUFFIX};
pub use upload::{list_artifacts, CycleReport, UploadWatcher};
