//! In-flight export tracking
//!
//! A study id is in the set exactly while an export for it runs. The lock is
//! only held for the membership check and never across an `.await`.

use crate::domain::StudyId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of study ids with an export in progress
#[derive(Debug, Clone, Default)]
pub struct ActiveSet {
    inner: Arc<Mutex<HashSet<StudyId>>>,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<StudyId>> {
        // a panic while holding the lock cannot leave the set half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `study_id`, or `None` if another export already holds it.
    ///
    /// The claim is released when the returned guard is dropped.
    pub fn try_claim(&self, study_id: &StudyId) -> Option<ActiveClaim> {
        if !self.lock().insert(study_id.clone()) {
            return None;
        }
        Some(ActiveClaim {
            set: self.clone(),
            study_id: study_id.clone(),
        })
    }

    pub fn contains(&self, study_id: &StudyId) -> bool {
        self.lock().contains(study_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Membership of one study in an [`ActiveSet`]
#[derive(Debug)]
pub struct ActiveClaim {
    set: ActiveSet,
    study_id: StudyId,
}

impl ActiveClaim {
    pub fn study_id(&self) -> &StudyId {
        &self.study_id
    }
}

impl Drop for ActiveClaim {
    fn drop(&mut self) {
        self.set.lock().remove(&self.study_id);
        tracing::trace!(study_id = %self.study_id, "Export claim released");
    }
}
