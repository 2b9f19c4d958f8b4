//! Session error types.

use crate::store::StoreError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors returned by session operations.
///
/// Corrupt state, inverted windows, premature completions and reminder
/// failures are handled inside the core and never appear here.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Step {index} does not exist (recipe has {len} steps)")]
    StepOutOfRange { index: usize, len: usize },

    #[error("Conflict decision no longer matches the run (current step {current})")]
    StaleDecision { current: usize },

    #[error("Step {index} timer is already running")]
    StepInProgress { index: usize },

    #[error("Target cannot be reached; earliest completion is {earliest}")]
    TargetUnreachable { earliest: DateTime<Utc> },

    #[error("Recipe is already complete")]
    Finished,
}
