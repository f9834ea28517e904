use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::activity::{ActivityEntry, ActivityLog};
use super::aggregator::StageCounters;
use super::domain::{
    ActorId, Application, ApplicationId, ApplicationNote, CandidateId, JobPostingId,
    NewApplication, PipelineScope, StageTransitionEvent,
};
use super::stage::Stage;

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("candidate {candidate} already applied to job posting {job_posting} as {existing}")]
    Duplicate {
        candidate: CandidateId,
        job_posting: JobPostingId,
        existing: ApplicationId,
    },
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    /// The record moved past the version the caller validated against.
    #[error("application {} changed concurrently (now version {})", .0.id, .0.version)]
    StaleVersion(Box<Application>),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A validated stage change waiting to be committed.
#[derive(Debug, Clone)]
pub(crate) struct StageChange {
    pub(crate) target: Stage,
    pub(crate) actor: ActorId,
    pub(crate) note: Option<String>,
    pub(crate) at: DateTime<Utc>,
}

#[derive(Debug)]
struct ApplicationEntry {
    application: Application,
    log: ActivityLog,
}

#[derive(Debug, Default)]
struct StoreIndex {
    entries: HashMap<ApplicationId, Arc<Mutex<ApplicationEntry>>>,
    by_pair: HashMap<(CandidateId, JobPostingId), ApplicationId>,
    by_job: HashMap<JobPostingId, Vec<ApplicationId>>,
    by_candidate: HashMap<CandidateId, Vec<ApplicationId>>,
    insertion_order: Vec<ApplicationId>,
}

/// In-memory application records and their activity logs.
///
/// Each application lives behind its own mutex together with its log, so a
/// stage change, its log entry and the counter adjustment commit as one unit
/// while other applications proceed in parallel. The index lock is only held
/// for lookups and inserts.
#[derive(Debug)]
pub struct ApplicationStore {
    index: RwLock<StoreIndex>,
    counters: Arc<StageCounters>,
    application_sequence: AtomicU64,
    activity_sequence: AtomicU64,
}

impl Default for ApplicationStore {
    fn default() -> Self {
        Self::new(Arc::new(StageCounters::default()))
    }
}

impl ApplicationStore {
    pub fn new(counters: Arc<StageCounters>) -> Self {
        Self {
            index: RwLock::new(StoreIndex::default()),
            counters,
            application_sequence: AtomicU64::new(1),
            activity_sequence: AtomicU64::new(1),
        }
    }

    pub fn counters(&self) -> Arc<StageCounters> {
        Arc::clone(&self.counters)
    }

    /// Record a new application in the initial stage.
    pub fn create(
        &self,
        new_application: NewApplication,
        created_at: DateTime<Utc>,
    ) -> Result<Application, StoreError> {
        let mut index = self.write_index()?;
        let pair = (
            new_application.candidate_id.clone(),
            new_application.job_posting_id.clone(),
        );

        if let Some(existing) = index.by_pair.get(&pair) {
            return Err(StoreError::Duplicate {
                candidate: pair.0,
                job_posting: pair.1,
                existing: existing.clone(),
            });
        }

        let sequence = self.application_sequence.fetch_add(1, Ordering::Relaxed);
        let application = Application {
            id: ApplicationId(format!("app-{sequence:06}")),
            job_posting_id: new_application.job_posting_id,
            organization_id: new_application.organization_id,
            candidate_id: new_application.candidate_id,
            candidate: new_application.candidate,
            stage: Stage::INITIAL,
            version: 0,
            created_at,
            updated_at: created_at,
        };

        let id = application.id.clone();
        index.by_pair.insert(pair, id.clone());
        index
            .by_job
            .entry(application.job_posting_id.clone())
            .or_default()
            .push(id.clone());
        index
            .by_candidate
            .entry(application.candidate_id.clone())
            .or_default()
            .push(id.clone());
        index.insertion_order.push(id.clone());
        index.entries.insert(
            id,
            Arc::new(Mutex::new(ApplicationEntry {
                application: application.clone(),
                log: ActivityLog::default(),
            })),
        );

        self.counters.on_create(&application);
        Ok(application)
    }

    pub fn get(&self, id: &ApplicationId) -> Result<Application, StoreError> {
        let entry = self.entry(id)?;
        let guard = lock_entry(&entry)?;
        Ok(guard.application.clone())
    }

    /// Applications for a job posting, oldest first.
    pub fn list_by_job(
        &self,
        job_posting_id: &JobPostingId,
        stage: Option<Stage>,
    ) -> Result<Vec<Application>, StoreError> {
        let entries = {
            let index = self.read_index()?;
            collect_entries(&index, index.by_job.get(job_posting_id))
        };

        let mut applications = snapshot_entries(&entries)?;
        if let Some(stage) = stage {
            applications.retain(|application| application.stage == stage);
        }
        Ok(applications)
    }

    pub fn list_by_candidate(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<Vec<Application>, StoreError> {
        let entries = {
            let index = self.read_index()?;
            collect_entries(&index, index.by_candidate.get(candidate_id))
        };
        snapshot_entries(&entries)
    }

    /// Every application inside an aggregation scope.
    pub fn list_in_scope(&self, scope: &PipelineScope) -> Result<Vec<Application>, StoreError> {
        let entries = {
            let index = self.read_index()?;
            match scope {
                PipelineScope::JobPosting(job_posting_id) => {
                    collect_entries(&index, index.by_job.get(job_posting_id))
                }
                PipelineScope::Organization(_) => {
                    collect_entries(&index, Some(&index.insertion_order))
                }
            }
        };

        let mut applications = snapshot_entries(&entries)?;
        applications.retain(|application| application.in_scope(scope));
        Ok(applications)
    }

    /// Stage transitions for one application in log order.
    pub fn history_for(&self, id: &ApplicationId) -> Result<Vec<StageTransitionEvent>, StoreError> {
        let entry = self.entry(id)?;
        let guard = lock_entry(&entry)?;
        Ok(guard.log.history())
    }

    /// Transitions and notes for one application in log order.
    pub fn activity_for(&self, id: &ApplicationId) -> Result<Vec<ActivityEntry>, StoreError> {
        let entry = self.entry(id)?;
        let guard = lock_entry(&entry)?;
        Ok(guard.log.entries())
    }

    /// Record and transition history read under a single lock.
    pub fn snapshot(
        &self,
        id: &ApplicationId,
    ) -> Result<(Application, Vec<StageTransitionEvent>), StoreError> {
        let entry = self.entry(id)?;
        let guard = lock_entry(&entry)?;
        Ok((guard.application.clone(), guard.log.history()))
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read_index()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Commit a stage change. Only the transition engine calls this; the
    /// change must already be validated against `expected_version`.
    pub(crate) fn update_stage(
        &self,
        id: &ApplicationId,
        expected_version: u64,
        change: StageChange,
    ) -> Result<(Application, StageTransitionEvent), StoreError> {
        let entry = self.entry(id)?;
        let mut guard = lock_entry(&entry)?;

        if guard.application.version != expected_version {
            return Err(StoreError::StaleVersion(Box::new(
                guard.application.clone(),
            )));
        }

        let from_stage = guard.application.stage;
        // keep the log monotonic even if the clock steps backwards
        let recorded_at = change.at.max(guard.application.updated_at);
        let sequence = self.activity_sequence.fetch_add(1, Ordering::Relaxed);
        let event = StageTransitionEvent {
            event_id: format!("evt-{sequence:08}"),
            application_id: id.clone(),
            from_stage,
            to_stage: change.target,
            actor: change.actor,
            note: change.note,
            recorded_at,
            sequence,
        };

        guard.log.append(ActivityEntry::Transition(event.clone()));
        guard.application.stage = change.target;
        guard.application.updated_at = recorded_at;
        guard.application.version += 1;

        self.counters
            .on_transition(&guard.application, from_stage, change.target);

        Ok((guard.application.clone(), event))
    }

    pub(crate) fn append_note(
        &self,
        id: &ApplicationId,
        actor: ActorId,
        body: String,
        at: DateTime<Utc>,
    ) -> Result<ApplicationNote, StoreError> {
        let entry = self.entry(id)?;
        let mut guard = lock_entry(&entry)?;

        let note = ApplicationNote {
            application_id: id.clone(),
            actor,
            body,
            recorded_at: at.max(guard.application.updated_at),
            sequence: self.activity_sequence.fetch_add(1, Ordering::Relaxed),
        };
        guard.log.append(ActivityEntry::Note(note.clone()));
        debug!(application_id = %id, sequence = note.sequence, "note appended");
        Ok(note)
    }

    fn entry(&self, id: &ApplicationId) -> Result<Arc<Mutex<ApplicationEntry>>, StoreError> {
        self.read_index()?
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn read_index(&self) -> Result<RwLockReadGuard<'_, StoreIndex>, StoreError> {
        self.index
            .read()
            .map_err(|_| StoreError::Unavailable("application index lock poisoned".to_string()))
    }

    fn write_index(&self) -> Result<RwLockWriteGuard<'_, StoreIndex>, StoreError> {
        self.index
            .write()
            .map_err(|_| StoreError::Unavailable("application index lock poisoned".to_string()))
    }
}

fn lock_entry(
    entry: &Arc<Mutex<ApplicationEntry>>,
) -> Result<MutexGuard<'_, ApplicationEntry>, StoreError> {
    entry
        .lock()
        .map_err(|_| StoreError::Unavailable("application record lock poisoned".to_string()))
}

fn collect_entries(
    index: &StoreIndex,
    ids: Option<&Vec<ApplicationId>>,
) -> Vec<Arc<Mutex<ApplicationEntry>>> {
    ids.map(|ids| {
        ids.iter()
            .filter_map(|id| index.entries.get(id).cloned())
            .collect()
    })
    .unwrap_or_default()
}

fn snapshot_entries(
    entries: &[Arc<Mutex<ApplicationEntry>>],
) -> Result<Vec<Application>, StoreError> {
    let mut applications = entries
        .iter()
        .map(|entry| lock_entry(entry).map(|guard| guard.application.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    // index vectors are in insertion order; the stable sort keeps it on ties
    applications.sort_by_key(|application| application.created_at);
    Ok(applications)
}
