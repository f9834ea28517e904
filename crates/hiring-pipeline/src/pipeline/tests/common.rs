use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::pipeline::{
    pipeline_router, ActorId, Application, ApplicationStore, CandidateFields, CandidateId, Clock,
    DirectoryError, HiringPipelineService, InMemoryJobPostingDirectory, JobPostingDirectory,
    JobPostingId, JobPostingRef, JobPostingStatus, MoveStageRequest, OrganizationId,
    DEFAULT_REBUILD_ATTEMPTS,
};

pub(super) const ORG: &str = "org-acme";
pub(super) const OTHER_ORG: &str = "org-globex";
pub(super) const ENGINEERING_JOB: &str = "job-eng-001";
pub(super) const OPERATIONS_JOB: &str = "job-ops-002";
pub(super) const CLOSED_JOB: &str = "job-closed-003";
pub(super) const GLOBEX_JOB: &str = "job-gx-004";

/// Clock that only moves when told to.
#[derive(Debug)]
pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard += by;
    }

    pub(super) fn rewind(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard -= by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

pub(super) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn posting(id: &str, organization: &str, status: JobPostingStatus) -> JobPostingRef {
    JobPostingRef {
        id: JobPostingId::new(id),
        organization_id: OrganizationId::new(organization),
        status,
    }
}

pub(super) fn directory() -> InMemoryJobPostingDirectory {
    InMemoryJobPostingDirectory::with_postings([
        posting(ENGINEERING_JOB, ORG, JobPostingStatus::Open),
        posting(OPERATIONS_JOB, ORG, JobPostingStatus::Open),
        posting(CLOSED_JOB, ORG, JobPostingStatus::Closed),
        posting(GLOBEX_JOB, OTHER_ORG, JobPostingStatus::Open),
    ])
}

pub(super) fn candidate(name: &str) -> CandidateFields {
    CandidateFields {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_ascii_lowercase().replace(' ', ".")),
        cover_letter: Some("I would love to join the team.".to_string()),
        resume_url: Some(format!(
            "https://files.example.com/resumes/{}.pdf",
            name.to_ascii_lowercase().replace(' ', "-")
        )),
        notes: None,
    }
}

pub(super) fn job(id: &str) -> JobPostingId {
    JobPostingId::new(id)
}

pub(super) fn recruiter() -> ActorId {
    ActorId::new("recruiter-1")
}

pub(super) type TestService = HiringPipelineService<InMemoryJobPostingDirectory>;

pub(super) fn build_service() -> (TestService, Arc<InMemoryJobPostingDirectory>, Arc<ManualClock>) {
    build_service_with_store(Arc::new(ApplicationStore::default()))
}

pub(super) fn apply(service: &TestService, job_id: &str, candidate_id: &str) -> Application {
    service
        .apply(
            &job(job_id),
            CandidateId::new(candidate_id),
            candidate(candidate_id),
        )
        .expect("application accepted")
}

pub(super) fn move_to(
    service: &TestService,
    application: &Application,
    stage: &str,
) -> Application {
    let (updated, _) = service
        .move_stage(MoveStageRequest::new(
            application.id.clone(),
            stage,
            recruiter(),
        ))
        .expect("transition succeeds");
    updated
}

/// Directory whose backing catalog is down.
pub(super) struct UnavailableDirectory;

impl JobPostingDirectory for UnavailableDirectory {
    fn job_posting_exists(&self, _id: &JobPostingId) -> Result<bool, DirectoryError> {
        Err(DirectoryError::Unavailable("catalog offline".to_string()))
    }

    fn get_job_posting(&self, _id: &JobPostingId) -> Result<Option<JobPostingRef>, DirectoryError> {
        Err(DirectoryError::Unavailable("catalog offline".to_string()))
    }
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    pipeline_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn build_service_with_store(
    store: Arc<ApplicationStore>,
) -> (TestService, Arc<InMemoryJobPostingDirectory>, Arc<ManualClock>) {
    let directory = Arc::new(directory());
    let clock = Arc::new(ManualClock::starting_at(start_time()));
    let service = HiringPipelineService::with_parts(
        directory.clone(),
        store,
        clock.clone(),
        DEFAULT_REBUILD_ATTEMPTS,
    );
    (service, directory, clock)
}
