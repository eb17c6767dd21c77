//! Study export orchestration
//!
//! - [`ActiveSet`] keeps two triggers for one study from overlapping
//! - [`ExportCoordinator`] drives a study from stable event to delivery requests
//! - [`ExportOutcome`] reports what one invocation did

pub mod active;
pub mod coordinator;
pub mod outcome;

pub use active::{ActiveClaim, ActiveSet};
pub use coordinator::{CoordinatorSettings, ExportCoordinator};
pub use outcome::{ExportOutcome, SkipReason};
