use hiring_pipeline::error::AppError;
use hiring_pipeline::pipeline::{
    InMemoryJobPostingDirectory, JobPostingId, JobPostingRef, JobPostingStatus, OrganizationId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Build the job posting directory from a JSON file, or fall back to the demo catalog.
pub(crate) fn load_directory(path: Option<&Path>) -> Result<InMemoryJobPostingDirectory, AppError> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            parse_postings(&raw, path)
        }
        None => {
            warn!("PIPELINE_POSTINGS_FILE not set; serving the demo job postings");
            Ok(demo_directory())
        }
    }
}

pub(crate) fn parse_postings(
    raw: &str,
    path: &Path,
) -> Result<InMemoryJobPostingDirectory, AppError> {
    let postings: Vec<JobPostingRef> =
        serde_json::from_str(raw).map_err(|source| AppError::Postings {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(InMemoryJobPostingDirectory::with_postings(postings))
}

pub(crate) fn demo_directory() -> InMemoryJobPostingDirectory {
    InMemoryJobPostingDirectory::with_postings(demo_postings())
}

pub(crate) fn demo_postings() -> Vec<JobPostingRef> {
    [
        ("job-backend-eng", "org-northwind", JobPostingStatus::Open),
        ("job-product-design", "org-northwind", JobPostingStatus::Open),
        ("job-support-lead", "org-northwind", JobPostingStatus::Closed),
        ("job-data-analyst", "org-contoso", JobPostingStatus::Open),
    ]
    .into_iter()
    .map(|(id, organization, status)| JobPostingRef {
        id: JobPostingId::new(id),
        organization_id: OrganizationId::new(organization),
        status,
    })
    .collect()
}
