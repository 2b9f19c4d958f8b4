//! Run state and the phases derived from it.

use crate::core::State;
use crate::recipe::StepId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Persisted progress of one recipe instance.
///
/// `current_step_index` only moves backwards through an explicit skip or
/// reset. A step id enters `completed_step_ids` when its timer starts (or
/// immediately, for steps without a wait).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeRunState {
    pub current_step_index: usize,
    pub completed_step_ids: BTreeSet<StepId>,
    /// Steps whose timer must not start before the given instant.
    #[serde(default)]
    pub delayed_starts: BTreeMap<StepId, DateTime<Utc>>,
    pub has_started: bool,
}

impl RecipeRunState {
    pub fn is_completed(&self, id: &StepId) -> bool {
        self.completed_step_ids.contains(id)
    }

    pub fn delayed_start(&self, id: &StepId) -> Option<DateTime<Utc>> {
        self.delayed_starts.get(id).copied()
    }
}

/// Observable position of a run, derived from run state and timers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    NotStarted,
    /// Step ready for its manual work; its timer has not begun.
    StepPending(usize),
    StepTimerRunning(usize),
    /// Timer ran out; the next tick advances.
    StepTimerExpiredAwaitingAdvance(usize),
    Completed,
}

impl State for RunPhase {
    fn name(&self) -> &str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::StepPending(_) => "StepPending",
            Self::StepTimerRunning(_) => "StepTimerRunning",
            Self::StepTimerExpiredAwaitingAdvance(_) => "StepTimerExpiredAwaitingAdvance",
            Self::Completed => "Completed",
        }
    }

    fn is_final(&self) -> bool {
        matches!(self, Self::Completed)
    }

    fn step_index(&self) -> Option<usize> {
        match self {
            Self::StepPending(i)
            | Self::StepTimerRunning(i)
            | Self::StepTimerExpiredAwaitingAdvance(i) => Some(*i),
            Self::NotStarted | Self::Completed => None,
        }
    }
}
