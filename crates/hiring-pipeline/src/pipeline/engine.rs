use std::sync::Arc;

use tracing::{debug, info};

use super::clock::Clock;
use super::domain::{ActorId, Application, ApplicationId, StageTransitionEvent};
use super::error::PipelineError;
use super::stage::Stage;
use super::store::{ApplicationStore, StageChange, StoreError};

/// Request to move an application to another stage.
#[derive(Debug, Clone)]
pub struct MoveStageRequest {
    pub application_id: ApplicationId,
    /// Raw stage name, validated against the registry.
    pub target_stage: String,
    pub actor: ActorId,
    pub note: Option<String>,
    /// Version the caller last saw; a mismatch yields `ConflictRetry`.
    pub expected_version: Option<u64>,
}

impl MoveStageRequest {
    pub fn new(
        application_id: ApplicationId,
        target_stage: impl Into<String>,
        actor: ActorId,
    ) -> Self {
        Self {
            application_id,
            target_stage: target_stage.into(),
            actor,
            note: None,
            expected_version: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn expecting_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Single writer for application stages.
///
/// Validation runs against a snapshot; the commit re-checks the snapshot's
/// version under the application lock, so two callers racing from the same
/// stale stage cannot both succeed.
pub struct TransitionEngine {
    store: Arc<ApplicationStore>,
    clock: Arc<dyn Clock>,
}

impl TransitionEngine {
    pub fn new(store: Arc<ApplicationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn move_stage(
        &self,
        request: MoveStageRequest,
    ) -> Result<(Application, StageTransitionEvent), PipelineError> {
        let MoveStageRequest {
            application_id,
            target_stage,
            actor,
            note,
            expected_version,
        } = request;

        let current = self.store.get(&application_id)?;
        let target: Stage = target_stage
            .parse()
            .map_err(|_| PipelineError::InvalidStage(target_stage.clone()))?;

        validate(&current, target)?;

        if let Some(expected) = expected_version {
            if expected != current.version {
                debug!(
                    %application_id,
                    expected,
                    actual = current.version,
                    "move rejected on stale version"
                );
                return Err(PipelineError::ConflictRetry {
                    stage: current.stage,
                    version: current.version,
                });
            }
        }

        let note = note
            .map(|note| note.trim().to_string())
            .filter(|note| !note.is_empty());
        let change = StageChange {
            target,
            actor,
            note,
            at: self.clock.now(),
        };

        match self
            .store
            .update_stage(&application_id, current.version, change)
        {
            Ok((application, event)) => {
                info!(
                    %application_id,
                    from = %event.from_stage,
                    to = %event.to_stage,
                    actor = %event.actor,
                    version = application.version,
                    "stage transition committed"
                );
                Ok((application, event))
            }
            Err(StoreError::StaleVersion(fresh)) => {
                // Another writer committed first; report against what it left behind.
                validate(&fresh, target)?;
                Err(PipelineError::ConflictRetry {
                    stage: fresh.stage,
                    version: fresh.version,
                })
            }
            Err(other) => Err(other.into()),
        }
    }
}

fn validate(application: &Application, target: Stage) -> Result<(), PipelineError> {
    if application.stage.is_terminal() {
        return Err(PipelineError::TerminalStageViolation {
            stage: application.stage,
        });
    }
    if application.stage == target {
        return Err(PipelineError::NoOpTransition { stage: target });
    }
    debug_assert!(application.stage.can_move_to(target));
    Ok(())
}
