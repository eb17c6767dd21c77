//! Host imaging server abstraction
//!
//! The export coordinator, change feed and health monitor only talk to the
//! host through [`HostServer`], so tests can substitute an in-memory fake.

use super::models::{ChangeBatch, PatientResource, StudyResource, SystemInfo};
use crate::domain::{Result, StudyId};
use async_trait::async_trait;

/// Operations the courier needs from the imaging server
#[async_trait]
pub trait HostServer: Send + Sync {
    /// Fetch a study; `Ok(None)` when the host does not know the id
    async fn get_study(&self, study_id: &StudyId) -> Result<Option<StudyResource>>;

    /// Fetch a patient; `Ok(None)` when the host does not know the id
    async fn get_patient(&self, patient_id: &str) -> Result<Option<PatientResource>>;

    /// Rewrite the study description (and the short study id tag).
    ///
    /// The host creates a new study and returns its id.
    async fn modify_study_description(
        &self,
        study_id: &StudyId,
        description: &str,
    ) -> Result<StudyId>;

    /// Whether the study is currently visible
    async fn study_exists(&self, study_id: &StudyId) -> Result<bool>;

    /// Download the study as archive bytes
    async fn download_archive(&self, study_id: &StudyId) -> Result<Vec<u8>>;

    /// Delete the study
    async fn delete_study(&self, study_id: &StudyId) -> Result<()>;

    /// Read the change log after sequence number `since`
    async fn changes(&self, since: u64, limit: u32) -> Result<ChangeBatch>;

    /// List every study id
    async fn list_studies(&self) -> Result<Vec<StudyId>>;

    /// Liveness probe
    async fn system_info(&self) -> Result<SystemInfo>;
}
