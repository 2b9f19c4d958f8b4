//! Per-recipe-instance step state machine.
//!
//! The sequencer owns [`RecipeRunState`] and derives a [`RunPhase`] from it
//! together with the timers. On resume the cached current index is
//! recomputed from which timers are running; the recomputed index wins.

mod machine;
mod snapshot;
mod state;

pub use machine::{run_state_key, StepSequencer, TimerView};
pub use snapshot::{check_snapshot, validate_snapshot, SnapshotIssue};
pub use state::{RecipeRunState, RunPhase};
