//! Consistency rules for a decoded run state.
//!
//! All issues are accumulated rather than stopping at the first one, so a
//! single log line explains everything wrong with a rejected snapshot.

use super::state::RecipeRunState;
use crate::checkpoint::CheckpointError;
use crate::recipe::{Recipe, StepId};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// A reason a persisted run state does not fit its recipe.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SnapshotIssue {
    #[error("current step {index} is beyond the {len} steps of the recipe")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("completed step '{0}' is not part of the recipe")]
    UnknownCompletedStep(StepId),

    #[error("delayed step '{0}' is not part of the recipe")]
    UnknownDelayedStep(StepId),
}

/// Check every rule, accumulating ALL issues.
pub fn validate_snapshot(
    state: &RecipeRunState,
    recipe: &Recipe,
) -> Validation<(), NonEmptyVec<SnapshotIssue>> {
    let mut checks: Vec<Validation<(), NonEmptyVec<SnapshotIssue>>> = Vec::new();

    // Index may equal len: the run is complete
    checks.push(if state.current_step_index > recipe.len() {
        Validation::fail(SnapshotIssue::IndexOutOfRange {
            index: state.current_step_index,
            len: recipe.len(),
        })
    } else {
        Validation::success(())
    });

    for id in &state.completed_step_ids {
        if !recipe.contains(id) {
            checks.push(Validation::fail(SnapshotIssue::UnknownCompletedStep(
                id.clone(),
            )));
        }
    }

    for id in state.delayed_starts.keys() {
        if !recipe.contains(id) {
            checks.push(Validation::fail(SnapshotIssue::UnknownDelayedStep(
                id.clone(),
            )));
        }
    }

    Validation::all_vec(checks).map(|_| ())
}

/// [`validate_snapshot`] folded into a checkpoint error.
pub fn check_snapshot(state: &RecipeRunState, recipe: &Recipe) -> Result<(), CheckpointError> {
    match validate_snapshot(state, recipe) {
        Validation::Success(_) => Ok(()),
        Validation::Failure(issues) => {
            let message = issues
                .iter()
                .map(|issue| issue.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            Err(CheckpointError::Inconsistent(message))
        }
    }
}
