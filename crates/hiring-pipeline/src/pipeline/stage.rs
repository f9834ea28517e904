use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of pipeline stages. Variant order is the advisory forward order,
/// with `Rejected` sorted last as the side branch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Applied,
    Screening,
    Interview,
    Assessment,
    Offer,
    Hired,
    Rejected,
}

impl Stage {
    pub const INITIAL: Stage = Stage::Applied;

    /// Forward progression used for progress display.
    pub const fn ordered() -> [Self; 6] {
        [
            Self::Applied,
            Self::Screening,
            Self::Interview,
            Self::Assessment,
            Self::Offer,
            Self::Hired,
        ]
    }

    pub const fn all() -> [Self; 7] {
        [
            Self::Applied,
            Self::Screening,
            Self::Interview,
            Self::Assessment,
            Self::Offer,
            Self::Hired,
            Self::Rejected,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Screening => "screening",
            Self::Interview => "interview",
            Self::Assessment => "assessment",
            Self::Offer => "offer",
            Self::Hired => "hired",
            Self::Rejected => "rejected",
        }
    }

    /// Terminal stages are absorbing: nothing moves out of them.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Hired | Self::Rejected)
    }

    /// Position along the forward order. `Rejected` has none.
    pub fn progress_index(self) -> Option<usize> {
        Self::ordered().iter().position(|stage| *stage == self)
    }

    /// Every stage reachable from `self` in one move.
    ///
    /// Backward moves are allowed between non-terminal stages; the forward
    /// order only drives presentation.
    pub fn allowed_targets(self) -> BTreeSet<Stage> {
        if self.is_terminal() {
            return BTreeSet::new();
        }

        Self::all()
            .into_iter()
            .filter(|stage| *stage != self)
            .collect()
    }

    pub fn can_move_to(self, target: Stage) -> bool {
        self.allowed_targets().contains(&target)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raised when a caller supplies a stage name outside the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pipeline stage '{0}'")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::all()
            .into_iter()
            .find(|stage| stage.label() == normalized)
            .ok_or_else(|| UnknownStage(raw.to_string()))
    }
}

pub fn is_valid_stage(name: &str) -> bool {
    name.parse::<Stage>().is_ok()
}
