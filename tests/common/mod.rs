//! Fakes of the external boundaries shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use study_courier::adapters::command::{CommandOutput, CommandRunner, CommandSpec};
use study_courier::adapters::delivery::{DeliveryClient, DeliveryRequest};
use study_courier::adapters::host::{
    ChangeBatch, ChangeEntry, HostServer, PatientResource, StudyResource, SystemInfo,
};
use study_courier::config::{parse_config, CourierConfig};
use study_courier::domain::{HostError, PipelineError, Result, StudyId};
use tower::ServiceExt;

/// Program name the tests configure for the uploader
pub const UPLOADER: &str = "fake-filesender";

/// Configuration rooted in `root`, with short delays
pub fn test_config(root: &Path) -> CourierConfig {
    let text = format!(
        r#"
[host]
base_url = "http://127.0.0.1:1"
settle_delay_ms = 1
visibility_poll_attempts = 1

[export]
export_dir = "{root}/exports"
default_passphrase = "default123"
delivery_pacing_ms = 0

[queue]
queue_dir = "{root}/mailqueue"

[uploader]
program = "{UPLOADER}"
args = []
username = "sender@example.org"

[monitor]
state_dir = "{root}/watcher"

[logging]
local_enabled = false
"#,
        root = root.display()
    );
    let config = parse_config(&text).unwrap();
    std::fs::create_dir_all(&config.export.export_dir).unwrap();
    std::fs::create_dir_all(&config.queue.queue_dir).unwrap();
    config
}

#[derive(Default)]
struct HostState {
    studies: HashMap<String, StudyResource>,
    patients: HashMap<String, PatientResource>,
    archives: HashMap<String, Vec<u8>>,
    changes: Vec<ChangeEntry>,
    deleted: Vec<String>,
    modified: Vec<String>,
    rewrites: u32,
}

/// In-memory imaging server
#[derive(Default)]
pub struct MemoryHost {
    state: Mutex<HostState>,
}

impl MemoryHost {
    pub fn add_study(&self, id: &str, description: &str, patient_id: &str) {
        let mut state = self.state.lock().unwrap();
        let patient_key = format!("patient-{patient_id}");
        state.studies.insert(
            id.to_string(),
            StudyResource {
                id: id.to_string(),
                is_stable: true,
                main_dicom_tags: HashMap::from([
                    ("StudyDescription".to_string(), description.to_string()),
                    ("StudyDate".to_string(), "20240315".to_string()),
                ]),
                parent_patient: Some(patient_key.clone()),
            },
        );
        state.patients.insert(
            patient_key.clone(),
            PatientResource {
                id: patient_key,
                main_dicom_tags: HashMap::from([(
                    "PatientID".to_string(),
                    patient_id.to_string(),
                )]),
            },
        );
        state
            .archives
            .insert(id.to_string(), format!("DICOM archive of {id}").into_bytes());
    }

    pub fn push_stable(&self, seq: u64, id: &str) {
        self.state.lock().unwrap().changes.push(ChangeEntry {
            seq,
            change_type: "StableStudy".to_string(),
            resource_type: "Study".to_string(),
            id: id.to_string(),
        });
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn modified(&self) -> Vec<String> {
        self.state.lock().unwrap().modified.clone()
    }

    pub fn study_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().unwrap().studies.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn description_of(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .studies
            .get(id)
            .map(|s| s.description().to_string())
    }
}

#[async_trait]
impl HostServer for MemoryHost {
    async fn get_study(&self, study_id: &StudyId) -> Result<Option<StudyResource>> {
        Ok(self.state.lock().unwrap().studies.get(study_id.as_str()).cloned())
    }

    async fn get_patient(&self, patient_id: &str) -> Result<Option<PatientResource>> {
        Ok(self.state.lock().unwrap().patients.get(patient_id).cloned())
    }

    async fn modify_study_description(
        &self,
        study_id: &StudyId,
        description: &str,
    ) -> Result<StudyId> {
        let mut state = self.state.lock().unwrap();
        let mut copy = state
            .studies
            .get(study_id.as_str())
            .cloned()
            .ok_or_else(|| HostError::NotFound(study_id.to_string()))?;
        state.rewrites += 1;
        let new_id = format!("{}-clean{}", study_id, state.rewrites);
        copy.id = new_id.clone();
        copy.main_dicom_tags
            .insert("StudyDescription".to_string(), description.to_string());
        state.studies.insert(new_id.clone(), copy);
        let archive = state
            .archives
            .get(study_id.as_str())
            .cloned()
            .unwrap_or_default();
        state.archives.insert(new_id.clone(), archive);
        state.modified.push(study_id.to_string());
        StudyId::new(new_id).map_err(|e| PipelineError::MetadataCleanupFailed(e).into())
    }

    async fn study_exists(&self, study_id: &StudyId) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .studies
            .contains_key(study_id.as_str()))
    }

    async fn download_archive(&self, study_id: &StudyId) -> Result<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .archives
            .get(study_id.as_str())
            .cloned()
            .ok_or_else(|| HostError::NotFound(study_id.to_string()).into())
    }

    async fn delete_study(&self, study_id: &StudyId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.studies.remove(study_id.as_str());
        state.archives.remove(study_id.as_str());
        state.deleted.push(study_id.to_string());
        Ok(())
    }

    async fn changes(&self, since: u64, limit: u32) -> Result<ChangeBatch> {
        let state = self.state.lock().unwrap();
        let pending: Vec<ChangeEntry> = state
            .changes
            .iter()
            .filter(|c| c.seq > since)
            .cloned()
            .collect();
        let batch: Vec<ChangeEntry> = pending.iter().take(limit as usize).cloned().collect();
        Ok(ChangeBatch {
            done: batch.len() == pending.len(),
            last: batch.last().map(|c| c.seq).unwrap_or(since),
            changes: batch,
        })
    }

    async fn list_studies(&self) -> Result<Vec<StudyId>> {
        Ok(self
            .study_ids()
            .into_iter()
            .filter_map(|id| StudyId::new(id).ok())
            .collect())
    }

    async fn system_info(&self) -> Result<SystemInfo> {
        Ok(SystemInfo {
            name: Some("memory".to_string()),
            version: Some("1.12.0".to_string()),
        })
    }
}

/// Stands in for the compressor and the uploader.
///
/// Compressor runs write a small file at the destination argument; uploader
/// runs are recorded and exit with the next scripted code (0 once the
/// script is exhausted).
#[derive(Default)]
pub struct ToolRunner {
    calls: Mutex<Vec<CommandSpec>>,
    upload_exit_codes: Mutex<Vec<i32>>,
}

impl ToolRunner {
    pub fn with_upload_exit_codes(codes: &[i32]) -> Self {
        Self {
            upload_exit_codes: Mutex::new(codes.iter().rev().copied().collect()),
            ..Self::default()
        }
    }

    pub fn compress_calls(&self) -> Vec<CommandSpec> {
        self.calls_of("7z")
    }

    pub fn upload_calls(&self) -> Vec<CommandSpec> {
        self.calls_of(UPLOADER)
    }

    fn calls_of(&self, program: &str) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ToolRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        let exit_code = if spec.program == "7z" {
            // a <type> <method> -y -p<pass> <dest> <source>
            std::fs::write(&spec.args[5], b"PK encrypted").unwrap();
            0
        } else {
            self.upload_exit_codes.lock().unwrap().pop().unwrap_or(0)
        };
        Ok(CommandOutput {
            exit_code: Some(exit_code),
            ..CommandOutput::default()
        })
    }
}

/// Delivery client that sends each request through the real endpoint router
pub struct RouterDelivery {
    router: Router,
    requests: Mutex<Vec<DeliveryRequest>>,
}

impl RouterDelivery {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<DeliveryRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryClient for RouterDelivery {
    async fn request_delivery(&self, request: &DeliveryRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("studyId", &request.study_id)
            .append_pair("file", &request.file)
            .append_pair("email", &request.email)
            .finish();
        let http_request = Request::builder()
            .method("POST")
            .uri("/send")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();

        let response = self.router.clone().oneshot(http_request).await.unwrap();
        if response.status().is_success() {
            Ok(())
        } else {
            Err(PipelineError::DeliveryRequestFailed(format!(
                "endpoint returned {}",
                response.status()
            ))
            .into())
        }
    }
}
