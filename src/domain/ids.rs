//! Domain identifier types with validation
//!
//! Newtype wrappers for the identifiers that flow through the pipeline.
//! Each type ensures type safety and validates its format on construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Host-server study identifier newtype wrapper
///
/// Identifiers are opaque strings assigned by the imaging server. A metadata
/// rewrite produces a new study, so one logical study can have several ids
/// over its lifetime.
///
/// # Examples
///
/// ```
/// use study_courier::domain::ids::StudyId;
/// use std::str::FromStr;
///
/// let id = StudyId::from_str("6b9e19d9-62094390-5f9ddb01-4a191ae7-9766b715").unwrap();
/// assert_eq!(id.as_str(), "6b9e19d9-62094390-5f9ddb01-4a191ae7-9766b715");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct StudyId(String);

impl StudyId {
    /// Creates a new StudyId from a string
    ///
    /// # Arguments
    ///
    /// * `id` - The study identifier string
    ///
    /// # Returns
    ///
    /// Returns `Ok(StudyId)` if the ID is valid, `Err` otherwise
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Study ID cannot be empty".to_string());
        }
        if id.contains('/') || id.contains('?') || id.contains('#') {
            return Err(format!("Study ID contains URL-reserved characters: {id}"));
        }
        Ok(Self(id))
    }

    /// Returns the study ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StudyId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for StudyId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for StudyId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Artifact file name newtype wrapper
///
/// The bare file name (no directory component) of a published artifact.
/// The same name is used in the export area, in the delivery queue and as
/// the ledger key, so it must never be able to escape a directory.
///
/// # Examples
///
/// ```
/// use study_courier::domain::ids::ArtifactName;
///
/// let name = ArtifactName::new("P001_20240101_CT_20240102T101500123.zip").unwrap();
/// assert_eq!(name.as_str(), "P001_20240101_CT_20240102T101500123.zip");
/// assert!(ArtifactName::new("../etc/passwd").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct ArtifactName(String);

impl ArtifactName {
    /// Creates a new ArtifactName, rejecting anything that is not a plain file name
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Artifact name cannot be empty".to_string());
        }
        if name.contains("..") {
            return Err(format!("Artifact name must not contain '..': {name}"));
        }
        if name.contains('/') || name.contains('\\') || name.contains('\0') {
            return Err(format!(
                "Artifact name must not contain path separators: {name}"
            ));
        }
        if name.starts_with('.') {
            return Err(format!("Artifact name must not be hidden: {name}"));
        }
        Ok(Self(name))
    }

    /// Returns the artifact name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of a sidecar file carrying `suffix` (e.g. `.uploaded`)
    pub fn with_suffix(&self, suffix: &str) -> String {
        format!("{}{}", self.0, suffix)
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ArtifactName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ArtifactName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl AsRef<str> for ArtifactName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
