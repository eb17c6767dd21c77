//! Domain models and types for the courier pipeline.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`StudyId`], [`ArtifactName`])
//! - **Study metadata** ([`StudyMetadata`])
//! - **Error types** ([`CourierError`], [`HostError`], [`PipelineError`])
//! - **Result type alias** ([`Result`])
//!
//! # Type Safety
//!
//! Identifiers use the newtype pattern so a study id can never be passed
//! where an artifact file name is expected:
//!
//! ```rust
//! use study_courier::domain::{ArtifactName, StudyId};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let study = StudyId::new("6b9e19d9-62094390")?;
//! let artifact = ArtifactName::new("P001_20240101_CT.zip")?;
//!
//! // let wrong: StudyId = artifact;  // Compile error!
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod ids;
pub mod result;
pub mod study;

// Re-export commonly used types for convenience
pub use errors::{CourierError, HostError, PipelineError, TransferError};
pub use ids::{ArtifactName, StudyId};
pub use result::Result;
pub use study::{ExportState, StudyMetadata};
