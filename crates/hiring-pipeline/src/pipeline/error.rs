use serde::Serialize;

use super::domain::{ApplicationId, CandidateId, JobPostingId};
use super::jobs::DirectoryError;
use super::stage::Stage;
use super::store::StoreError;

/// Error raised by the pipeline service and transition engine.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("application {0} not found")]
    ApplicationNotFound(ApplicationId),
    #[error("job posting {0} not found")]
    JobPostingNotFound(JobPostingId),
    #[error("job posting {0} is not accepting applications")]
    JobPostingClosed(JobPostingId),
    #[error("candidate {candidate} already applied to job posting {job_posting}")]
    DuplicateApplication {
        candidate: CandidateId,
        job_posting: JobPostingId,
        existing: ApplicationId,
    },
    #[error("unknown pipeline stage '{0}'")]
    InvalidStage(String),
    #[error("application is in terminal stage {stage}; no further transitions are allowed")]
    TerminalStageViolation { stage: Stage },
    #[error("application is already in stage {stage}")]
    NoOpTransition { stage: Stage },
    #[error("application changed concurrently (now {stage}, version {version}); reload and retry")]
    ConflictRetry { stage: Stage, version: u64 },
    #[error("note body must not be empty")]
    InvalidNote,
    #[error(transparent)]
    Storage(StoreError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Caller-facing classification of [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorKind {
    NotFound,
    DuplicateApplication,
    JobPostingClosed,
    InvalidStage,
    InvalidNote,
    TerminalStageViolation,
    NoOpTransition,
    ConflictRetry,
    Unavailable,
}

impl PipelineError {
    pub fn kind(&self) -> PipelineErrorKind {
        match self {
            PipelineError::ApplicationNotFound(_) | PipelineError::JobPostingNotFound(_) => {
                PipelineErrorKind::NotFound
            }
            PipelineError::DuplicateApplication { .. } => PipelineErrorKind::DuplicateApplication,
            PipelineError::JobPostingClosed(_) => PipelineErrorKind::JobPostingClosed,
            PipelineError::InvalidStage(_) => PipelineErrorKind::InvalidStage,
            PipelineError::InvalidNote => PipelineErrorKind::InvalidNote,
            PipelineError::TerminalStageViolation { .. } => {
                PipelineErrorKind::TerminalStageViolation
            }
            PipelineError::NoOpTransition { .. } => PipelineErrorKind::NoOpTransition,
            PipelineError::ConflictRetry { .. } => PipelineErrorKind::ConflictRetry,
            PipelineError::Storage(_) | PipelineError::Directory(_) => {
                PipelineErrorKind::Unavailable
            }
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => PipelineError::ApplicationNotFound(id),
            StoreError::Duplicate {
                candidate,
                job_posting,
                existing,
            } => PipelineError::DuplicateApplication {
                candidate,
                job_posting,
                existing,
            },
            StoreError::StaleVersion(current) => PipelineError::ConflictRetry {
                stage: current.stage,
                version: current.version,
            },
            other => PipelineError::Storage(other),
        }
    }
}
