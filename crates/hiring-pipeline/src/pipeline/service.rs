use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::activity::{replay_stage, ActivityEntry};
use super::aggregator::{PipelineAggregator, PipelineSummary, RebuildReport};
use super::clock::{Clock, SystemClock};
use super::domain::{
    ActorId, Application, ApplicationId, ApplicationNote, CandidateFields, CandidateId,
    JobPostingId, NewApplication, PipelineScope, StageTransitionEvent,
};
use super::engine::{MoveStageRequest, TransitionEngine};
use super::error::PipelineError;
use super::jobs::JobPostingDirectory;
use super::stage::Stage;
use super::store::ApplicationStore;

pub const DEFAULT_REBUILD_ATTEMPTS: u8 = 3;

/// Result of replaying an application's log against its stored stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyAudit {
    pub application_id: ApplicationId,
    pub stored_stage: Stage,
    pub replayed_stage: Option<Stage>,
    pub transitions: usize,
    pub consistent: bool,
}

/// Facade composing the job directory, store, transition engine and aggregator.
pub struct HiringPipelineService<D> {
    directory: Arc<D>,
    store: Arc<ApplicationStore>,
    engine: TransitionEngine,
    aggregator: PipelineAggregator,
    clock: Arc<dyn Clock>,
}

impl<D> HiringPipelineService<D>
where
    D: JobPostingDirectory + 'static,
{
    pub fn new(directory: Arc<D>) -> Self {
        Self::with_parts(
            directory,
            Arc::new(ApplicationStore::default()),
            Arc::new(SystemClock),
            DEFAULT_REBUILD_ATTEMPTS,
        )
    }

    pub fn with_parts(
        directory: Arc<D>,
        store: Arc<ApplicationStore>,
        clock: Arc<dyn Clock>,
        rebuild_attempts: u8,
    ) -> Self {
        let engine = TransitionEngine::new(Arc::clone(&store), Arc::clone(&clock));
        let aggregator = PipelineAggregator::new(Arc::clone(&store), rebuild_attempts);
        Self {
            directory,
            store,
            engine,
            aggregator,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<ApplicationStore> {
        &self.store
    }

    /// Record a candidate's application to an open job posting.
    pub fn apply(
        &self,
        job_posting_id: &JobPostingId,
        candidate_id: CandidateId,
        candidate: CandidateFields,
    ) -> Result<Application, PipelineError> {
        let posting = self
            .directory
            .get_job_posting(job_posting_id)?
            .ok_or_else(|| PipelineError::JobPostingNotFound(job_posting_id.clone()))?;

        if !posting.status.accepts_applications() {
            return Err(PipelineError::JobPostingClosed(posting.id));
        }

        let application = self.store.create(
            NewApplication {
                job_posting_id: posting.id,
                organization_id: posting.organization_id,
                candidate_id,
                candidate,
            },
            self.clock.now(),
        )?;

        info!(
            application_id = %application.id,
            job_posting_id = %application.job_posting_id,
            candidate_id = %application.candidate_id,
            "application recorded"
        );
        Ok(application)
    }

    pub fn get(&self, application_id: &ApplicationId) -> Result<Application, PipelineError> {
        Ok(self.store.get(application_id)?)
    }

    pub fn applications_by_job(
        &self,
        job_posting_id: &JobPostingId,
        stage_filter: Option<&str>,
    ) -> Result<Vec<Application>, PipelineError> {
        if !self.directory.job_posting_exists(job_posting_id)? {
            return Err(PipelineError::JobPostingNotFound(job_posting_id.clone()));
        }
        let stage = stage_filter
            .map(|raw| {
                raw.parse::<Stage>()
                    .map_err(|_| PipelineError::InvalidStage(raw.to_string()))
            })
            .transpose()?;
        Ok(self.store.list_by_job(job_posting_id, stage)?)
    }

    pub fn applications_by_candidate(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<Vec<Application>, PipelineError> {
        Ok(self.store.list_by_candidate(candidate_id)?)
    }

    pub fn move_stage(
        &self,
        request: MoveStageRequest,
    ) -> Result<(Application, StageTransitionEvent), PipelineError> {
        self.engine.move_stage(request)
    }

    pub fn add_note(
        &self,
        application_id: &ApplicationId,
        actor: ActorId,
        body: &str,
    ) -> Result<ApplicationNote, PipelineError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(PipelineError::InvalidNote);
        }
        Ok(self
            .store
            .append_note(application_id, actor, body.to_string(), self.clock.now())?)
    }

    pub fn activity_history(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<StageTransitionEvent>, PipelineError> {
        Ok(self.store.history_for(application_id)?)
    }

    pub fn activity(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ActivityEntry>, PipelineError> {
        Ok(self.store.activity_for(application_id)?)
    }

    /// Notes on one application in log order.
    pub fn notes(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<ApplicationNote>, PipelineError> {
        Ok(self
            .store
            .activity_for(application_id)?
            .into_iter()
            .filter_map(|entry| match entry {
                ActivityEntry::Note(note) => Some(note),
                ActivityEntry::Transition(_) => None,
            })
            .collect())
    }

    pub fn pipeline_summary(
        &self,
        scope: &PipelineScope,
    ) -> Result<PipelineSummary, PipelineError> {
        self.ensure_scope_known(scope)?;
        Ok(self.aggregator.summary(scope)?)
    }

    pub fn rebuild(&self, scope: &PipelineScope) -> Result<RebuildReport, PipelineError> {
        self.ensure_scope_known(scope)?;
        Ok(self.aggregator.rebuild(scope)?)
    }

    /// Replay the activity log and compare it with the stored stage.
    pub fn audit_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ConsistencyAudit, PipelineError> {
        let (application, history) = self.store.snapshot(application_id)?;
        let replayed_stage = match replay_stage(&history) {
            Ok(stage) => Some(stage),
            Err(broken) => {
                warn!(%application_id, error = %broken, "activity log does not replay");
                None
            }
        };
        let consistent = replayed_stage == Some(application.stage)
            && history.len() as u64 == application.version;

        Ok(ConsistencyAudit {
            application_id: application.id,
            stored_stage: application.stage,
            replayed_stage,
            transitions: history.len(),
            consistent,
        })
    }

    // Job scopes must name a posting in the directory; organizations are open-ended.
    fn ensure_scope_known(&self, scope: &PipelineScope) -> Result<(), PipelineError> {
        if let PipelineScope::JobPosting(job_posting_id) = scope {
            if !self.directory.job_posting_exists(job_posting_id)? {
                return Err(PipelineError::JobPostingNotFound(job_posting_id.clone()));
            }
        }
        Ok(())
    }
}
