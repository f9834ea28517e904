//! Hiring pipeline core: stage registry, application store, transition engine,
//! stage aggregation and the per-application activity log.
//!
//! Stage changes only happen through [`TransitionEngine::move_stage`]. The store
//! commits the log entry, the materialized stage and the counter adjustment
//! under one per-application lock.

pub mod activity;
pub mod aggregator;
pub mod clock;
pub mod domain;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod router;
pub mod service;
pub mod stage;
pub mod store;

#[cfg(test)]
mod tests;

pub use activity::{replay_stage, ActivityEntry, ActivityLog, BrokenChain};
pub use aggregator::{PipelineAggregator, PipelineSummary, RebuildReport, StageCounters, StageDrift};
pub use clock::{Clock, SystemClock};
pub use domain::{
    ActorId, Application, ApplicationId, ApplicationNote, CandidateFields, CandidateId,
    JobPostingId, NewApplication, OrganizationId, PipelineScope, StageTransitionEvent,
};
pub use engine::{MoveStageRequest, TransitionEngine};
pub use error::{PipelineError, PipelineErrorKind};
pub use jobs::{
    DirectoryError, InMemoryJobPostingDirectory, JobPostingDirectory, JobPostingRef,
    JobPostingStatus,
};
pub use router::{pipeline_router, ACTOR_HEADER};
pub use service::{ConsistencyAudit, HiringPipelineService, DEFAULT_REBUILD_ATTEMPTS};
pub use stage::{is_valid_stage, Stage, UnknownStage};
pub use store::{ApplicationStore, StoreError};
