//! Phase transition history.
//!
//! Keeps an ordered, immutable record of the phases a run has passed
//! through, as observed by the session.

use super::state::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of a single observed phase change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PhaseTransition<S: State> {
    /// The phase being left
    pub from: S,
    /// The phase being entered
    pub to: S,
    /// When the change was observed
    pub at: DateTime<Utc>,
}

/// Ordered history of phase transitions.
///
/// History is immutable - `record` returns a new history with the
/// transition appended.
///
/// # Example
///
/// ```rust
/// use leaven::core::{PhaseHistory, PhaseTransition};
/// use leaven::sequencer::RunPhase;
/// use chrono::Utc;
///
/// let history = PhaseHistory::new().record(PhaseTransition {
///     from: RunPhase::NotStarted,
///     to: RunPhase::StepTimerRunning(0),
///     at: Utc::now(),
/// });
///
/// assert_eq!(history.path(), vec![&RunPhase::NotStarted, &RunPhase::StepTimerRunning(0)]);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PhaseHistory<S: State> {
    transitions: Vec<PhaseTransition<S>>,
}

impl<S: State> Default for PhaseHistory<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State> PhaseHistory<S> {
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
        }
    }

    /// Record a transition, returning a new history.
    pub fn record(&self, transition: PhaseTransition<S>) -> Self {
        let mut transitions = self.transitions.clone();
        transitions.push(transition);
        Self { transitions }
    }

    /// Phases traversed: the first `from`, then every `to` in order.
    pub fn path(&self) -> Vec<&S> {
        let mut path = Vec::new();
        if let Some(first) = self.transitions.first() {
            path.push(&first.from);
        }
        for transition in &self.transitions {
            path.push(&transition.to);
        }
        path
    }

    pub fn transitions(&self) -> &[PhaseTransition<S>] {
        &self.transitions
    }
}
