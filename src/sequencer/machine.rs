//! Step sequencing for one recipe instance.

use super::snapshot::check_snapshot;
use super::state::{RecipeRunState, RunPhase};
use crate::checkpoint::{Checkpoint, CheckpointError, Codec};
use crate::notify::NotificationPort;
use crate::recipe::{Recipe, Step, StepId};
use crate::store::{KeyValueStore, StoreError};
use crate::timer::{StepTimerRecord, TimerEngine};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Read-only view of timer state used by the sequencer.
pub trait TimerView {
    fn is_active(&self, step_id: &StepId, now: DateTime<Utc>) -> bool;

    fn record(&self, step_id: &StepId) -> Option<&StepTimerRecord>;
}

impl<S: KeyValueStore, N: NotificationPort> TimerView for TimerEngine<S, N> {
    fn is_active(&self, step_id: &StepId, now: DateTime<Utc>) -> bool {
        TimerEngine::is_active(self, step_id, now)
    }

    fn record(&self, step_id: &StepId) -> Option<&StepTimerRecord> {
        TimerEngine::record(self, step_id)
    }
}

/// Store key for a recipe instance's run state.
pub fn run_state_key(recipe: &Recipe) -> String {
    format!("run-{}", recipe.id())
}

/// Owner and only writer of a [`RecipeRunState`].
///
/// Mutations mark the state dirty; [`StepSequencer::flush`] persists it at
/// the end of the event or tick that changed it.
pub struct StepSequencer<S: KeyValueStore> {
    recipe: Recipe,
    state: RecipeRunState,
    store: S,
    codec: Codec,
    dirty: bool,
    resetting: bool,
}

impl<S: KeyValueStore> StepSequencer<S> {
    /// Fresh sequencer; nothing is read from `store`.
    pub fn new(recipe: Recipe, store: S, codec: Codec) -> Self {
        Self {
            recipe,
            state: RecipeRunState::default(),
            store,
            codec,
            dirty: false,
            resetting: false,
        }
    }

    /// Restore run state from `store`.
    ///
    /// Missing, undecodable or inconsistent state yields a fresh run; the
    /// second value is `true` when persisted state had to be discarded.
    pub fn load(recipe: Recipe, store: S, codec: Codec) -> (Self, bool) {
        let mut sequencer = Self::new(recipe, store, codec);
        let mut discarded = false;

        match sequencer.read_state() {
            Ok(Some(state)) => sequencer.state = state,
            Ok(None) => debug!(recipe = %sequencer.recipe.id(), "no persisted run state"),
            Err(e) => {
                warn!(recipe = %sequencer.recipe.id(), "discarding persisted run state: {e}");
                discarded = true;
            }
        }

        (sequencer, discarded)
    }

    fn read_state(&self) -> Result<Option<RecipeRunState>, StoreError> {
        let Some(bytes) = self.store.read(&run_state_key(&self.recipe))? else {
            return Ok(None);
        };
        let state = self.codec.decode::<RecipeRunState>(&bytes)?.payload;
        check_snapshot(&state, &self.recipe).map_err(StoreError::from)?;
        Ok(Some(state))
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn state(&self) -> &RecipeRunState {
        &self.state
    }

    pub fn current_index(&self) -> usize {
        self.state.current_step_index
    }

    /// Step at the current index, `None` once the run is complete.
    pub fn current_step(&self) -> Option<&Step> {
        self.recipe.step(self.state.current_step_index)
    }

    pub fn is_finished(&self) -> bool {
        self.state.current_step_index >= self.recipe.len()
    }

    pub fn has_pending_save(&self) -> bool {
        self.dirty
    }

    /// Index the run should be at, given which timers are running.
    ///
    /// With `h` the highest completed step: a running timer on `h` makes it
    /// current; otherwise the step after `h` is current, or the run is
    /// complete when `h` is the last step and its timer has been observed
    /// finished. With nothing completed, the highest running timer (if any)
    /// wins, else the first step.
    pub fn reconciled_index(&self, timers: &impl TimerView, now: DateTime<Utc>) -> usize {
        let steps = self.recipe.steps();
        let highest_completed = steps
            .iter()
            .rposition(|s| self.state.is_completed(&s.id));
        let highest_active = steps.iter().rposition(|s| timers.is_active(&s.id, now));

        match (highest_active, highest_completed) {
            (Some(active), Some(completed)) if active >= completed => active,
            (Some(active), None) => active,
            (_, Some(completed)) => {
                let next = completed + 1;
                let last_unobserved = steps
                    .get(completed)
                    .and_then(|s| timers.record(&s.id))
                    .is_some_and(|r| r.active);
                if next < steps.len() || !last_unobserved {
                    next
                } else {
                    completed
                }
            }
            (None, None) => 0,
        }
    }

    /// Replace the cached current index with the one derived from timers.
    ///
    /// Returns `true` when the cached index was wrong.
    pub fn reconcile_on_load(&mut self, timers: &impl TimerView, now: DateTime<Utc>) -> bool {
        let index = self.reconciled_index(timers, now);
        if index == self.state.current_step_index {
            return false;
        }
        info!(
            recipe = %self.recipe.id(),
            cached = self.state.current_step_index,
            derived = index,
            "current step recomputed from timers"
        );
        self.state.current_step_index = index;
        self.dirty = true;
        true
    }

    /// Derive the observable phase. Never mutates.
    pub fn phase(&self, timers: &impl TimerView, now: DateTime<Utc>) -> RunPhase {
        if !self.state.has_started
            && self.state.completed_step_ids.is_empty()
            && self.state.delayed_starts.is_empty()
        {
            return RunPhase::NotStarted;
        }

        let index = self.state.current_step_index;
        let Some(step) = self.recipe.step(index) else {
            return RunPhase::Completed;
        };

        if timers.is_active(&step.id, now) {
            RunPhase::StepTimerRunning(index)
        } else if self.state.is_completed(&step.id)
            && timers.record(&step.id).is_some_and(|r| r.is_due(now))
        {
            RunPhase::StepTimerExpiredAwaitingAdvance(index)
        } else {
            RunPhase::StepPending(index)
        }
    }

    /// Record that the timer of step `index` began (or that an untimed step
    /// was done). The current index never moves backwards here.
    pub fn mark_started(&mut self, index: usize) {
        let Some(step) = self.recipe.step(index) else {
            return;
        };
        let id = step.id.clone();
        self.state.delayed_starts.remove(&id);
        self.state.completed_step_ids.insert(id);
        self.state.has_started = true;
        if index > self.state.current_step_index {
            self.state.current_step_index = index;
        }
        self.dirty = true;
    }

    /// Move past step `index` if it is current. Returns the new index.
    pub fn advance_from(&mut self, index: usize) -> Option<usize> {
        if self.state.current_step_index != index || self.is_finished() {
            return None;
        }
        self.state.current_step_index = index + 1;
        self.dirty = true;
        if self.is_finished() {
            info!(recipe = %self.recipe.id(), "recipe completed");
        } else {
            info!(recipe = %self.recipe.id(), step = index + 1, "advanced to next step");
        }
        Some(index + 1)
    }

    /// Overwrite the current index. Completed steps and timers are untouched.
    pub fn skip_to(&mut self, index: usize) {
        info!(
            recipe = %self.recipe.id(),
            from = self.state.current_step_index,
            to = index,
            "skipped to step"
        );
        self.state.current_step_index = index;
        self.state.has_started = true;
        self.dirty = true;
    }

    pub fn set_delayed_start(&mut self, id: StepId, at: DateTime<Utc>) {
        debug!(recipe = %self.recipe.id(), step = %id, start = %at, "step start delayed");
        self.state.delayed_starts.insert(id, at);
        self.dirty = true;
    }

    /// Drop delayed starts of step `index` and every later step.
    pub fn clear_delays_from(&mut self, index: usize) {
        let before = self.state.delayed_starts.len();
        for step in self.recipe.steps().iter().skip(index) {
            self.state.delayed_starts.remove(&step.id);
        }
        if self.state.delayed_starts.len() != before {
            self.dirty = true;
        }
    }

    /// Remove and return delayed starts that are due, in step order.
    pub fn take_due_delayed(&mut self, now: DateTime<Utc>) -> Vec<usize> {
        let due: Vec<StepId> = self
            .state
            .delayed_starts
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        if due.is_empty() {
            return Vec::new();
        }

        for id in &due {
            self.state.delayed_starts.remove(id);
        }
        self.dirty = true;

        let mut indices: Vec<usize> = due
            .iter()
            .filter_map(|id| self.recipe.index_of(id))
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Clear in-memory state and suppress saves until [`Self::finish_reset`].
    pub fn begin_reset(&mut self) {
        self.resetting = true;
        self.state = RecipeRunState::default();
        self.dirty = false;
    }

    /// Remove the persisted run state and re-enable saves.
    pub fn finish_reset(&mut self) -> Result<(), StoreError> {
        let result = self.store.remove(&run_state_key(&self.recipe));
        self.resetting = false;
        self.dirty = false;
        info!(recipe = %self.recipe.id(), "run reset");
        result
    }

    /// Persist pending changes. Skipped while a reset is in progress.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.resetting {
            debug!(recipe = %self.recipe.id(), "save suppressed during reset");
            return Ok(());
        }
        if !self.dirty {
            return Ok(());
        }
        let bytes = self.encode_state()?;
        self.store.write(&run_state_key(&self.recipe), &bytes)?;
        self.dirty = false;
        Ok(())
    }

    fn encode_state(&self) -> Result<Vec<u8>, CheckpointError> {
        self.codec.encode(&Checkpoint::new(&self.state, Utc::now()))
    }
}
