use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::Stage;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Identifier wrapper for submitted applications.
    ApplicationId
);
identifier!(JobPostingId);
identifier!(OrganizationId);
identifier!(
    /// Stable identity of the applying candidate, issued by the auth layer.
    CandidateId
);
identifier!(
    /// Authenticated user recorded on activity entries.
    ActorId
);

/// Display-only candidate details carried with the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFields {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_letter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Input to the store when a candidate applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplication {
    pub job_posting_id: JobPostingId,
    pub organization_id: OrganizationId,
    pub candidate_id: CandidateId,
    pub candidate: CandidateFields,
}

/// One candidate's submission to one job posting.
///
/// `stage` is a materialized cache of the activity log tail and `version`
/// counts committed transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub job_posting_id: JobPostingId,
    pub organization_id: OrganizationId,
    pub candidate_id: CandidateId,
    pub candidate: CandidateFields,
    pub stage: Stage,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn scopes(&self) -> [PipelineScope; 2] {
        [
            PipelineScope::Organization(self.organization_id.clone()),
            PipelineScope::JobPosting(self.job_posting_id.clone()),
        ]
    }

    pub fn in_scope(&self, scope: &PipelineScope) -> bool {
        match scope {
            PipelineScope::Organization(id) => self.organization_id == *id,
            PipelineScope::JobPosting(id) => self.job_posting_id == *id,
        }
    }
}

/// Immutable record of a committed stage change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransitionEvent {
    pub event_id: String,
    pub application_id: ApplicationId,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub actor: ActorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub sequence: u64,
}

/// Free-form remark attached to an application without changing its stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationNote {
    pub application_id: ApplicationId,
    pub actor: ActorId,
    pub body: String,
    pub recorded_at: DateTime<Utc>,
    pub sequence: u64,
}

/// Aggregation boundary for stage counters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PipelineScope {
    Organization(OrganizationId),
    JobPosting(JobPostingId),
}

impl fmt::Display for PipelineScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineScope::Organization(id) => write!(f, "organization:{id}"),
            PipelineScope::JobPosting(id) => write!(f, "job_posting:{id}"),
        }
    }
}
