use serde::{Deserialize, Serialize};

use super::domain::{ApplicationNote, StageTransitionEvent};
use super::stage::Stage;

/// Entry kinds recorded in an application's activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEntry {
    Transition(StageTransitionEvent),
    Note(ApplicationNote),
}

impl ActivityEntry {
    pub fn sequence(&self) -> u64 {
        match self {
            ActivityEntry::Transition(event) => event.sequence,
            ActivityEntry::Note(note) => note.sequence,
        }
    }

    fn sort_key(&self) -> (chrono::DateTime<chrono::Utc>, u64) {
        match self {
            ActivityEntry::Transition(event) => (event.recorded_at, event.sequence),
            ActivityEntry::Note(note) => (note.recorded_at, note.sequence),
        }
    }
}

/// Append-only history for a single application.
///
/// There is no way to edit or remove an entry once appended.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: Vec<ActivityEntry>,
}

impl ActivityLog {
    pub(crate) fn append(&mut self, entry: ActivityEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries ordered by timestamp, insertion order breaking ties.
    pub fn entries(&self) -> Vec<ActivityEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(ActivityEntry::sort_key);
        entries
    }

    /// Stage transitions only, in the same order as [`ActivityLog::entries`].
    pub fn history(&self) -> Vec<StageTransitionEvent> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                ActivityEntry::Transition(event) => Some(event),
                ActivityEntry::Note(_) => None,
            })
            .collect()
    }

    pub fn last_transition(&self) -> Option<&StageTransitionEvent> {
        self.entries.iter().rev().find_map(|entry| match entry {
            ActivityEntry::Transition(event) => Some(event),
            ActivityEntry::Note(_) => None,
        })
    }
}

/// Replay failure: an event does not start where the previous one ended.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event {sequence} moves from {recorded} but the replayed stage is {expected}")]
pub struct BrokenChain {
    pub sequence: u64,
    pub expected: Stage,
    pub recorded: Stage,
}

/// Reconstruct the current stage by replaying transitions from the initial stage.
pub fn replay_stage(events: &[StageTransitionEvent]) -> Result<Stage, BrokenChain> {
    events.iter().try_fold(Stage::INITIAL, |current, event| {
        if event.from_stage != current {
            return Err(BrokenChain {
                sequence: event.sequence,
                expected: current,
                recorded: event.from_stage,
            });
        }
        Ok(event.to_stage)
    })
}
