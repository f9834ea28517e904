use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{Application, PipelineScope};
use super::stage::Stage;
use super::store::{ApplicationStore, StoreError};

/// Stage counts for one scope. Stages without applications are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub scope: PipelineScope,
    pub counts: BTreeMap<Stage, u64>,
    pub total: u64,
}

impl PipelineSummary {
    fn from_counts(scope: PipelineScope, counts: &BTreeMap<Stage, u64>) -> Self {
        let counts: BTreeMap<Stage, u64> = counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(stage, count)| (*stage, *count))
            .collect();
        let total = counts.values().sum();
        Self {
            scope,
            counts,
            total,
        }
    }

    pub fn count(&self, stage: Stage) -> u64 {
        self.counts.get(&stage).copied().unwrap_or(0)
    }
}

/// Difference between a maintained counter and the recomputed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDrift {
    pub stage: Stage,
    pub counted: u64,
    pub actual: u64,
}

/// Outcome of a full recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub scope: PipelineScope,
    pub attempts: u8,
    /// False when concurrent commits kept moving the scope on every attempt.
    pub applied: bool,
    pub drift: Vec<StageDrift>,
    pub summary: PipelineSummary,
}

#[derive(Debug, Default, Clone)]
struct ScopeCounters {
    counts: BTreeMap<Stage, u64>,
    /// Bumped on every committed adjustment so a rebuild can detect races.
    epoch: u64,
    drifted: bool,
}

/// Live counters keyed by scope.
///
/// Adjustments arrive from the store while it holds the application's lock,
/// so a counter change is part of the same commit as the stage change.
#[derive(Debug, Default)]
pub struct StageCounters {
    scopes: Mutex<HashMap<PipelineScope, ScopeCounters>>,
}

impl StageCounters {
    pub(crate) fn on_create(&self, application: &Application) {
        let mut scopes = self.lock();
        for scope in application.scopes() {
            let counters = scopes.entry(scope).or_default();
            *counters.counts.entry(application.stage).or_insert(0) += 1;
            counters.epoch += 1;
        }
    }

    pub(crate) fn on_transition(&self, application: &Application, from: Stage, to: Stage) {
        let mut scopes = self.lock();
        for scope in application.scopes() {
            let counters = scopes.entry(scope.clone()).or_default();
            let current = counters.counts.entry(from).or_insert(0);
            if *current == 0 {
                warn!(%scope, stage = %from, application_id = %application.id, "stage counter underflow, scope flagged for rebuild");
                counters.drifted = true;
            } else {
                *current -= 1;
            }
            *counters.counts.entry(to).or_insert(0) += 1;
            counters.epoch += 1;
        }
    }

    fn snapshot(&self, scope: &PipelineScope) -> Option<ScopeCounters> {
        self.lock().get(scope).cloned()
    }

    fn epoch(&self, scope: &PipelineScope) -> u64 {
        self.lock().get(scope).map_or(0, |counters| counters.epoch)
    }

    /// Swap in recomputed counts unless a commit landed since `epoch` was read.
    fn replace_if_unchanged(
        &self,
        scope: &PipelineScope,
        epoch: u64,
        counts: BTreeMap<Stage, u64>,
    ) -> Result<BTreeMap<Stage, u64>, u64> {
        let mut scopes = self.lock();
        let counters = scopes.entry(scope.clone()).or_default();
        if counters.epoch != epoch {
            return Err(counters.epoch);
        }
        counters.drifted = false;
        Ok(std::mem::replace(&mut counters.counts, counts))
    }

    fn flag(&self, scope: &PipelineScope) {
        self.lock().entry(scope.clone()).or_default().drifted = true;
    }

    // Counters are derived state; after a panic elsewhere they are still
    // usable and a rebuild restores them.
    fn lock(&self) -> MutexGuard<'_, HashMap<PipelineScope, ScopeCounters>> {
        self.scopes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serves stage summaries from live counters, with a full recompute path
/// over the application store for repair.
pub struct PipelineAggregator {
    store: Arc<ApplicationStore>,
    counters: Arc<StageCounters>,
    rebuild_attempts: u8,
}

impl PipelineAggregator {
    pub fn new(store: Arc<ApplicationStore>, rebuild_attempts: u8) -> Self {
        let counters = store.counters();
        Self {
            store,
            counters,
            rebuild_attempts: rebuild_attempts.max(1),
        }
    }

    /// Current counts for a scope. Scopes flagged as drifted are rebuilt first.
    pub fn summary(&self, scope: &PipelineScope) -> Result<PipelineSummary, StoreError> {
        match self.counters.snapshot(scope) {
            Some(counters) if counters.drifted => {
                let report = self.rebuild(scope)?;
                Ok(report.summary)
            }
            Some(counters) => Ok(PipelineSummary::from_counts(scope.clone(), &counters.counts)),
            None => Ok(PipelineSummary::from_counts(scope.clone(), &BTreeMap::new())),
        }
    }

    /// Recompute a scope from current application records.
    ///
    /// Drift is logged rather than returned as an error. When commits keep
    /// racing the scan, the scope stays flagged and the next read retries.
    pub fn rebuild(&self, scope: &PipelineScope) -> Result<RebuildReport, StoreError> {
        let mut last_counts = BTreeMap::new();

        for attempt in 1..=self.rebuild_attempts {
            let epoch = self.counters.epoch(scope);
            let fresh = tally(&self.store.list_in_scope(scope)?);
            last_counts = fresh.clone();

            match self.counters.replace_if_unchanged(scope, epoch, fresh.clone()) {
                Ok(previous) => {
                    let drift = diff(&previous, &fresh);
                    if drift.is_empty() {
                        debug!(%scope, attempt, "pipeline counters verified");
                    } else {
                        warn!(%scope, attempt, drifted_stages = drift.len(), "pipeline counters drifted, repaired from store");
                    }
                    return Ok(RebuildReport {
                        scope: scope.clone(),
                        attempts: attempt,
                        applied: true,
                        drift,
                        summary: PipelineSummary::from_counts(scope.clone(), &fresh),
                    });
                }
                Err(current_epoch) => {
                    debug!(%scope, attempt, epoch, current_epoch, "commit raced pipeline rebuild, rescanning");
                }
            }
        }

        self.counters.flag(scope);
        info!(%scope, attempts = self.rebuild_attempts, "pipeline rebuild deferred by concurrent commits");
        Ok(RebuildReport {
            scope: scope.clone(),
            attempts: self.rebuild_attempts,
            applied: false,
            drift: Vec::new(),
            summary: PipelineSummary::from_counts(scope.clone(), &last_counts),
        })
    }
}

fn tally(applications: &[Application]) -> BTreeMap<Stage, u64> {
    let mut counts = BTreeMap::new();
    for application in applications {
        *counts.entry(application.stage).or_insert(0) += 1;
    }
    counts
}

fn diff(previous: &BTreeMap<Stage, u64>, fresh: &BTreeMap<Stage, u64>) -> Vec<StageDrift> {
    Stage::all()
        .into_iter()
        .filter_map(|stage| {
            let counted = previous.get(&stage).copied().unwrap_or(0);
            let actual = fresh.get(&stage).copied().unwrap_or(0);
            (counted != actual).then_some(StageDrift {
                stage,
                counted,
                actual,
            })
        })
        .collect()
}

#[cfg(test)]
impl StageCounters {
    /// Corrupt a counter to exercise the repair path.
    pub(crate) fn force_count(&self, scope: &PipelineScope, stage: Stage, count: u64) {
        let mut scopes = self.lock();
        let counters = scopes.entry(scope.clone()).or_default();
        counters.counts.insert(stage, count);
    }
}
