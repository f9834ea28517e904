use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ActorId, ApplicationId, CandidateFields, CandidateId, JobPostingId, OrganizationId,
    PipelineScope,
};
use super::engine::MoveStageRequest;
use super::error::{PipelineError, PipelineErrorKind};
use super::jobs::JobPostingDirectory;
use super::service::HiringPipelineService;

/// Header carrying the authenticated user, set by the upstream gateway.
pub const ACTOR_HEADER: &str = "x-actor-id";

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub candidate_id: CandidateId,
    #[serde(flatten)]
    pub candidate: CandidateFields,
}

#[derive(Debug, Deserialize)]
pub struct MoveStageBody {
    pub stage: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct NoteBody {
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StageFilter {
    #[serde(default)]
    pub stage: Option<String>,
}

/// Router builder exposing the pipeline endpoints.
pub fn pipeline_router<D>(service: Arc<HiringPipelineService<D>>) -> Router
where
    D: JobPostingDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/jobs/:job_id/applications",
            post(apply_handler::<D>).get(list_by_job_handler::<D>),
        )
        .route("/api/v1/jobs/:job_id/pipeline", get(job_summary_handler::<D>))
        .route(
            "/api/v1/jobs/:job_id/pipeline/rebuild",
            post(rebuild_handler::<D>),
        )
        .route(
            "/api/v1/organizations/:organization_id/pipeline",
            get(organization_summary_handler::<D>),
        )
        .route(
            "/api/v1/organizations/:organization_id/pipeline/rebuild",
            post(organization_rebuild_handler::<D>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(application_handler::<D>),
        )
        .route(
            "/api/v1/applications/:application_id/stage",
            put(move_stage_handler::<D>),
        )
        .route(
            "/api/v1/applications/:application_id/activity",
            get(activity_handler::<D>),
        )
        .route(
            "/api/v1/applications/:application_id/notes",
            post(note_handler::<D>).get(list_notes_handler::<D>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/applications",
            get(candidate_applications_handler::<D>),
        )
        .with_state(service)
}

pub(crate) async fn apply_handler<D>(
    State(service): State<Arc<HiringPipelineService<D>>>,
    Path(job_id): Path<String>,
    Json(request): Json<ApplyRequest>,
) -> Response
where
    D: JobPostingDirectory + 'static,
{
    match service.apply(
        &JobPostingId(job_id),
        request.candidate_id,
        request.candidate,
    ) {
        Ok(application) => (StatusCode::CREATED, Json(application)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_by_job_handler<D>(
    State(service): State<Arc<HiringPipelineService<D>>>,
    Path(job_id): Path<String>,
    Query(filter): Query<StageFilter>,
) -> Response
where
    D: JobPostingDirectory + 'static,
{
    match service.applications_by_job(&JobPostingId(job_id), filter.stage.as_deref()) {
        Ok(applications) => (StatusCode::OK, Json(applications)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn job_summary_handler<D>(
    State(service): State<Arc<HiringPipelineService<D>>>,
    Path(job_id): Path<String>,
) -> Response
where
    D: JobPostingDirectory + 'static,
{
    summary_response(&service, PipelineScope::JobPosting(JobPostingId(job_id)))
}

pub(crate) async fn organization_summary_handler<D>(
    State(service): State<Arc<HiringPipelineService<D>>>,
    Path(organization_id): Path<String>,
) -> Response
where
    D: JobPostingDirectory + 'static,
{
    summary_response(
        &service,
        PipelineScope::Organization(OrganizationId(organization_id)),
    )
}

pub(crate) async fn rebuild_handler<D>(
    State(service): State<Arc<HiringPipelineService<D>>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    D: JobPostingDirectory + 'static,
{
    if let Err(response) = actor_from(&headers) {
        return response;
    }
    rebuild_response(&service, PipelineScope::JobPosting(JobPostingId(job_id)))
}

pub(crate) async fn organization_rebuild_handler<D>(
    State(service): State<Arc<HiringPipelineService<D>>>,
    Path(organization_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    D: JobPostingDirectory + 'static,
{
    if let Err(response) = actor_from(&headers) {
        return response;
    }
    rebuild_response(
        &service,
        PipelineScope::Organization(OrganizationId(organization_id)),
    )
}

pub(crate) async fn application_handler<D>(
    State(service): State<Arc<HiringPipelineService<D>>>,
    Path(application_id): Path<String>,
) -> Response
where
    D: JobPostingDirectory + 'static,
{
    match service.get(&ApplicationId(application_id)) {
        Ok(application) => (StatusCode::OK, Json(application)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn move_stage_handler<D>(
    State(service): State<Arc<HiringPipelineService<D>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MoveStageBody>,
) -> Response
where
    D: JobPostingDirectory + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let request = MoveStageRequest {
        application_id: ApplicationId(application_id),
        target_stage: body.stage,
        actor,
        note: body.note,
        expected_version: body.expected_version,
    };

    match service.move_stage(request) {
        Ok((application, _event)) => (StatusCode::OK, Json(application)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn activity_handler<D>(
    State(service): State<Arc<HiringPipelineService<D>>>,
    Path(application_id): Path<String>,
) -> Response
where
    D: JobPostingDirectory + 'static,
{
    match service.activity_history(&ApplicationId(application_id)) {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn note_handler<D>(
    State(service): State<Arc<HiringPipelineService<D>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<NoteBody>,
) -> Response
where
    D: JobPostingDirectory + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match service.add_note(&ApplicationId(application_id), actor, &body.body) {
        Ok(note) => (StatusCode::CREATED, Json(note)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_notes_handler<D>(
    State(service): State<Arc<HiringPipelineService<D>>>,
    Path(application_id): Path<String>,
) -> Response
where
    D: JobPostingDirectory + 'static,
{
    match service.notes(&ApplicationId(application_id)) {
        Ok(notes) => (StatusCode::OK, Json(notes)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn candidate_applications_handler<D>(
    State(service): State<Arc<HiringPipelineService<D>>>,
    Path(candidate_id): Path<String>,
) -> Response
where
    D: JobPostingDirectory + 'static,
{
    match service.applications_by_candidate(&CandidateId(candidate_id)) {
        Ok(applications) => (StatusCode::OK, Json(applications)).into_response(),
        Err(error) => error_response(error),
    }
}

fn summary_response<D>(service: &HiringPipelineService<D>, scope: PipelineScope) -> Response
where
    D: JobPostingDirectory + 'static,
{
    match service.pipeline_summary(&scope) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

fn rebuild_response<D>(service: &HiringPipelineService<D>, scope: PipelineScope) -> Response
where
    D: JobPostingDirectory + 'static,
{
    match service.rebuild(&scope) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

fn actor_from(headers: &HeaderMap) -> Result<ActorId, Response> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ActorId::new)
        .ok_or_else(|| {
            let payload = json!({
                "error": format!("missing {ACTOR_HEADER} header"),
                "kind": "unauthenticated",
            });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

pub(crate) fn error_response(error: PipelineError) -> Response {
    let kind = error.kind();
    let status = match kind {
        PipelineErrorKind::NotFound => StatusCode::NOT_FOUND,
        PipelineErrorKind::DuplicateApplication
        | PipelineErrorKind::TerminalStageViolation
        | PipelineErrorKind::NoOpTransition
        | PipelineErrorKind::ConflictRetry => StatusCode::CONFLICT,
        PipelineErrorKind::InvalidStage
        | PipelineErrorKind::InvalidNote
        | PipelineErrorKind::JobPostingClosed => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    };

    let mut payload = json!({
        "error": error.to_string(),
        "kind": kind,
    });
    match &error {
        PipelineError::ConflictRetry { stage, version } => {
            payload["current_stage"] = json!(stage);
            payload["current_version"] = json!(version);
        }
        PipelineError::DuplicateApplication { existing, .. } => {
            payload["existing_application_id"] = json!(existing);
        }
        PipelineError::TerminalStageViolation { stage }
        | PipelineError::NoOpTransition { stage } => {
            payload["current_stage"] = json!(stage);
        }
        _ => {}
    }

    (status, Json(payload)).into_response()
}
