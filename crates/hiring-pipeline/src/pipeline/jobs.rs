use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::domain::{JobPostingId, OrganizationId};

/// Publication state of a posting as reported by the job catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPostingStatus {
    Open,
    Paused,
    Closed,
}

impl JobPostingStatus {
    pub const fn accepts_applications(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// The slice of a job posting this crate needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPostingRef {
    pub id: JobPostingId,
    pub organization_id: OrganizationId,
    pub status: JobPostingStatus,
}

/// Read access to the job posting catalog, owned by another service.
pub trait JobPostingDirectory: Send + Sync {
    fn job_posting_exists(&self, id: &JobPostingId) -> Result<bool, DirectoryError>;
    fn get_job_posting(&self, id: &JobPostingId) -> Result<Option<JobPostingRef>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("job posting directory unavailable: {0}")]
    Unavailable(String),
}

/// Directory backed by a map, used by the service binary and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryJobPostingDirectory {
    postings: Arc<RwLock<HashMap<JobPostingId, JobPostingRef>>>,
}

impl InMemoryJobPostingDirectory {
    pub fn with_postings(postings: impl IntoIterator<Item = JobPostingRef>) -> Self {
        let directory = Self::default();
        for posting in postings {
            directory.upsert(posting);
        }
        directory
    }

    pub fn upsert(&self, posting: JobPostingRef) {
        let mut guard = self
            .postings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.insert(posting.id.clone(), posting);
    }

    pub fn set_status(&self, id: &JobPostingId, status: JobPostingStatus) -> bool {
        let mut guard = self
            .postings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.get_mut(id) {
            Some(posting) => {
                posting.status = status;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.postings
            .read()
            .map(|guard| guard.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobPostingDirectory for InMemoryJobPostingDirectory {
    fn job_posting_exists(&self, id: &JobPostingId) -> Result<bool, DirectoryError> {
        Ok(self.get_job_posting(id)?.is_some())
    }

    fn get_job_posting(&self, id: &JobPostingId) -> Result<Option<JobPostingRef>, DirectoryError> {
        let guard = self
            .postings
            .read()
            .map_err(|_| DirectoryError::Unavailable("posting map lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }
}
