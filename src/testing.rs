//! In-memory fakes of the external boundaries, for unit tests

use crate::adapters::delivery::{DeliveryClient, DeliveryRequest};
use crate::adapters::host::models::{
    ChangeBatch, ChangeEntry, PatientResource, StudyResource, SystemInfo,
};
use crate::adapters::host::HostServer;
use crate::domain::{HostError, PipelineError, Result, StudyId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct HostState {
    studies: HashMap<String, StudyResource>,
    patients: HashMap<String, PatientResource>,
    archives: HashMap<String, Vec<u8>>,
    changes: Vec<ChangeEntry>,
    deleted: Vec<String>,
    modify_calls: Vec<(String, String)>,
    rewrites: u32,
    rewritten_archive_empty: bool,
    modify_fails: bool,
    down: bool,
}

/// Imaging server kept in a mutex-guarded map
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a study whose parent patient has `PatientID = P001`
    pub fn add_study(&self, id: &str, description: &str, stable: bool, archive: &[u8]) {
        let mut state = self.state.lock().unwrap();
        let patient_key = format!("patient-{id}");
        state.studies.insert(
            id.to_string(),
            StudyResource {
                id: id.to_string(),
                is_stable: stable,
                main_dicom_tags: HashMap::from([
                    ("StudyDescription".to_string(), description.to_string()),
                    ("StudyDate".to_string(), "20240101".to_string()),
                ]),
                parent_patient: Some(patient_key.clone()),
            },
        );
        state.patients.insert(
            patient_key.clone(),
            PatientResource {
                id: patient_key,
                main_dicom_tags: HashMap::from([("PatientID".to_string(), "P001".to_string())]),
            },
        );
        state.archives.insert(id.to_string(), archive.to_vec());
    }

    pub fn push_change(&self, seq: u64, change_type: &str, resource_type: &str, id: &str) {
        self.state.lock().unwrap().changes.push(ChangeEntry {
            seq,
            change_type: change_type.to_string(),
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        });
    }

    pub fn set_rewritten_archive_empty(&self, empty: bool) {
        self.state.lock().unwrap().rewritten_archive_empty = empty;
    }

    pub fn set_modify_fails(&self, fails: bool) {
        self.state.lock().unwrap().modify_fails = fails;
    }

    pub fn set_down(&self, down: bool) {
        self.state.lock().unwrap().down = down;
    }

    pub fn description_of(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .studies
            .get(id)
            .map(|s| s.description().to_string())
    }

    pub fn has_study(&self, id: &str) -> bool {
        self.state.lock().unwrap().studies.contains_key(id)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn modify_calls(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().modify_calls.clone()
    }

    fn check_up(&self) -> Result<()> {
        if self.state.lock().unwrap().down {
            return Err(HostError::ConnectionFailed("connection refused".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl HostServer for FakeHost {
    async fn get_study(&self, study_id: &StudyId) -> Result<Option<StudyResource>> {
        self.check_up()?;
        Ok(self.state.lock().unwrap().studies.get(study_id.as_str()).cloned())
    }

    async fn get_patient(&self, patient_id: &str) -> Result<Option<PatientResource>> {
        self.check_up()?;
        Ok(self.state.lock().unwrap().patients.get(patient_id).cloned())
    }

    async fn modify_study_description(
        &self,
        study_id: &StudyId,
        description: &str,
    ) -> Result<StudyId> {
        self.check_up()?;
        let mut state = self.state.lock().unwrap();
        state
            .modify_calls
            .push((study_id.to_string(), description.to_string()));
        if state.modify_fails {
            return Err(HostError::InvalidResponse("no ID".to_string()).into());
        }
        let original = state
            .studies
            .get(study_id.as_str())
            .cloned()
            .ok_or_else(|| HostError::NotFound(study_id.to_string()))?;

        state.rewrites += 1;
        let new_id = format!("{}-m{}", study_id, state.rewrites);
        let mut copy = original;
        copy.id = new_id.clone();
        copy.main_dicom_tags
            .insert("StudyDescription".to_string(), description.to_string());
        state.studies.insert(new_id.clone(), copy);

        let bytes = if state.rewritten_archive_empty {
            Vec::new()
        } else {
            state
                .archives
                .get(study_id.as_str())
                .cloned()
                .unwrap_or_default()
        };
        state.archives.insert(new_id.clone(), bytes);

        StudyId::new(new_id).map_err(|e| PipelineError::MetadataCleanupFailed(e).into())
    }

    async fn study_exists(&self, study_id: &StudyId) -> Result<bool> {
        self.check_up()?;
        Ok(self.state.lock().unwrap().studies.contains_key(study_id.as_str()))
    }

    async fn download_archive(&self, study_id: &StudyId) -> Result<Vec<u8>> {
        self.check_up()?;
        self.state
            .lock()
            .unwrap()
            .archives
            .get(study_id.as_str())
            .cloned()
            .ok_or_else(|| HostError::NotFound(study_id.to_string()).into())
    }

    async fn delete_study(&self, study_id: &StudyId) -> Result<()> {
        self.check_up()?;
        let mut state = self.state.lock().unwrap();
        state.studies.remove(study_id.as_str());
        state.archives.remove(study_id.as_str());
        state.deleted.push(study_id.to_string());
        Ok(())
    }

    async fn changes(&self, since: u64, limit: u32) -> Result<ChangeBatch> {
        self.check_up()?;
        let state = self.state.lock().unwrap();
        let pending: Vec<ChangeEntry> = state
            .changes
            .iter()
            .filter(|c| c.seq > since)
            .cloned()
            .collect();
        let batch: Vec<ChangeEntry> = pending.iter().take(limit as usize).cloned().collect();
        let last = batch.last().map(|c| c.seq).unwrap_or(since);
        Ok(ChangeBatch {
            done: batch.len() == pending.len(),
            changes: batch,
            last,
        })
    }

    async fn list_studies(&self) -> Result<Vec<StudyId>> {
        self.check_up()?;
        let state = self.state.lock().unwrap();
        let mut ids: Vec<StudyId> = state
            .studies
            .keys()
            .filter_map(|id| StudyId::new(id.clone()).ok())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn system_info(&self) -> Result<SystemInfo> {
        self.check_up()?;
        Ok(SystemInfo {
            name: Some("fake".to_string()),
            version: Some("1.12.0".to_string()),
        })
    }
}

/// Delivery client that records requests and fails for chosen recipients
#[derive(Default)]
pub struct RecordingDelivery {
    pub requests: Mutex<Vec<DeliveryRequest>>,
    pub failing: Vec<String>,
}

impl RecordingDelivery {
    pub fn failing_for(emails: &[&str]) -> Self {
        Self {
            failing: emails.iter().map(|e| e.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<DeliveryRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryClient for RecordingDelivery {
    async fn request_delivery(&self, request: &DeliveryRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failing.contains(&request.email) {
            return Err(PipelineError::DeliveryRequestFailed("endpoint returned 500".to_string()).into());
        }
        Ok(())
    }
}
