//! Wire models of the host imaging server REST API

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Study resource as returned by `GET /studies/{id}`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct StudyResource {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(default)]
    pub is_stable: bool,

    #[serde(default)]
    pub main_dicom_tags: HashMap<String, String>,

    #[serde(default)]
    pub parent_patient: Option<String>,
}

impl StudyResource {
    pub fn description(&self) -> &str {
        self.main_dicom_tags
            .get("StudyDescription")
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn study_date(&self) -> Option<&str> {
        self.main_dicom_tags.get("StudyDate").map(String::as_str)
    }
}

/// Patient resource as returned by `GET /patients/{id}`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PatientResource {
    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(default)]
    pub main_dicom_tags: HashMap<String, String>,
}

impl PatientResource {
    pub fn patient_id(&self) -> Option<&str> {
        self.main_dicom_tags.get("PatientID").map(String::as_str)
    }
}

/// Body of `POST /studies/{id}/modify`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyRequest {
    pub replace: HashMap<String, String>,
    pub force: bool,
}

/// Response of `POST /studies/{id}/modify`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyResponse {
    #[serde(rename = "ID")]
    pub id: Option<String>,

    #[serde(default)]
    pub path: Option<String>,
}

/// One entry of the change log
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeEntry {
    pub seq: u64,
    pub change_type: String,
    pub resource_type: String,
    #[serde(rename = "ID")]
    pub id: String,
}

impl ChangeEntry {
    /// Whether this change announces a study that finished receiving instances
    pub fn is_stable_study(&self) -> bool {
        self.change_type == "StableStudy" && self.resource_type == "Study"
    }
}

/// Response of `GET /changes?since=..&limit=..`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeBatch {
    #[serde(default)]
    pub changes: Vec<ChangeEntry>,
    pub done: bool,
    pub last: u64,
}

/// Response of `GET /system`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct SystemInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}
