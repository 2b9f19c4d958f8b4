//! A running recipe instance.
//!
//! [`RecipeSession`] ties a [`TimerEngine`] and a [`StepSequencer`] to one
//! clock and cooking window. Every user action is one method call; the host
//! calls [`RecipeSession::tick`] at the configured interval. Read methods
//! never mutate; all expiry and advancement happens in `tick` or at the
//! start of an action.

mod error;
mod outcome;

pub use error::SessionError;
pub use outcome::{
    CompletionOutcome, ResolutionOutcome, ScheduledCompletion, SkipOutcome, TickReport,
};

use crate::checkpoint::Codec;
use crate::config::Settings;
use crate::conflict::{
    auto_delay_future_steps, detect_conflict, project, ConflictReport, ProjectedStep, Resolution,
};
use crate::core::{add_span, sub_span, Clock, PhaseHistory, PhaseTransition};
use crate::notify::{NotificationPayload, NotificationPort};
use crate::recipe::{Recipe, Step, StepId};
use crate::sequencer::{RecipeRunState, RunPhase, StepSequencer};
use crate::store::{KeyValueStore, StoreError};
use crate::timer::{LoadReport, TimerEngine};
use crate::window::CookingWindow;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

/// One recipe instance driven by a clock.
///
/// The store is shared by the timer engine and the sequencer, so `S` must
/// be a cheap handle (`Clone`). One session per store: the timer map lives
/// under a single key and the engine rewrites it whole.
///
/// # Example
///
/// ```rust
/// use leaven::core::ManualClock;
/// use leaven::notify::InMemoryNotifier;
/// use leaven::recipe::Recipe;
/// use leaven::session::{CompletionOutcome, RecipeSession};
/// use leaven::store::MemoryStore;
/// use leaven::Settings;
/// use chrono::{Duration, TimeZone, Utc};
///
/// let recipe = Recipe::builder("loaf", "Loaf")
///     .step("mix", "Mix", Duration::zero())
///     .step("bulk", "Bulk ferment", Duration::hours(4))
///     .build()
///     .unwrap();
/// let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
///
/// let mut session = RecipeSession::open(
///     recipe,
///     &clock,
///     MemoryStore::new(),
///     InMemoryNotifier::new(),
///     &Settings::default(),
/// );
///
/// session.complete_current_step().unwrap();
/// let outcome = session.complete_current_step().unwrap();
/// assert!(matches!(outcome, CompletionOutcome::Started { index: 1, .. }));
///
/// clock.advance(Duration::hours(4));
/// let report = session.tick();
/// assert_eq!(report.advanced_to, Some(2));
/// assert!(session.is_finished());
/// ```
pub struct RecipeSession<C: Clock, S: KeyValueStore + Clone, N: NotificationPort> {
    clock: C,
    window: CookingWindow,
    engine: TimerEngine<S, N>,
    sequencer: StepSequencer<S>,
    finished_while_away: Vec<StepId>,
    recovered_from_corruption: bool,
    history: PhaseHistory<RunPhase>,
    last_phase: RunPhase,
}

impl<C: Clock, S: KeyValueStore + Clone, N: NotificationPort> RecipeSession<C, S, N> {
    /// Open a session with window and encoding taken from `settings`.
    pub fn open(recipe: Recipe, clock: C, store: S, notifier: N, settings: &Settings) -> Self {
        Self::open_with(
            recipe,
            clock,
            store,
            notifier,
            settings.cooking_window(),
            settings.storage.format,
        )
    }

    /// Restore timers and run state from `store` and reconcile them.
    ///
    /// Unreadable state starts a fresh run. The cached current index is
    /// replaced by the one derived from timers.
    pub fn open_with(
        recipe: Recipe,
        clock: C,
        store: S,
        notifier: N,
        window: CookingWindow,
        codec: Codec,
    ) -> Self {
        let now = clock.now();
        let (engine, load) = TimerEngine::load(store.clone(), notifier, codec, now);
        let (mut sequencer, discarded) = StepSequencer::load(recipe, store, codec);
        sequencer.reconcile_on_load(&engine, now);

        let LoadReport {
            finished_while_away,
            recovered_from_corruption,
        } = load;
        let finished_while_away = finished_while_away
            .into_iter()
            .filter(|id| sequencer.recipe().contains(id))
            .collect();

        let last_phase = sequencer.phase(&engine, now);
        let mut session = Self {
            clock,
            window,
            engine,
            sequencer,
            finished_while_away,
            recovered_from_corruption: recovered_from_corruption || discarded,
            history: PhaseHistory::new(),
            last_phase,
        };
        session.flush_run_state();

        info!(
            recipe = %session.sequencer.recipe().id(),
            step = session.sequencer.current_index(),
            "session opened"
        );
        session
    }

    pub fn recipe(&self) -> &Recipe {
        self.sequencer.recipe()
    }

    pub fn run_state(&self) -> &RecipeRunState {
        self.sequencer.state()
    }

    pub fn window(&self) -> &CookingWindow {
        &self.window
    }

    pub fn engine(&self) -> &TimerEngine<S, N> {
        &self.engine
    }

    pub fn current_index(&self) -> usize {
        self.sequencer.current_index()
    }

    pub fn is_finished(&self) -> bool {
        self.sequencer.is_finished()
    }

    /// Steps whose timers ran out while the process was not running.
    pub fn finished_while_away(&self) -> &[StepId] {
        &self.finished_while_away
    }

    /// Clear the finished-while-away notice once it has been shown.
    pub fn acknowledge_finished_while_away(&mut self) {
        self.finished_while_away.clear();
    }

    /// Whether persisted state had to be discarded at open.
    pub fn recovered_from_corruption(&self) -> bool {
        self.recovered_from_corruption
    }

    pub fn history(&self) -> &PhaseHistory<RunPhase> {
        &self.history
    }

    pub fn phase(&self) -> RunPhase {
        self.sequencer.phase(&self.engine, self.clock.now())
    }

    /// Time left on step `index`'s timer.
    ///
    /// A timer that has finished reports zero for as long as its record is
    /// kept; `None` means the step's timer never ran.
    pub fn remaining(&self, index: usize) -> Option<Duration> {
        let step = self.sequencer.recipe().step(index)?;
        self.engine
            .record(&step.id)
            .map(|record| record.remaining(self.clock.now()))
    }

    /// Every running timer with its remaining time.
    pub fn active_timers(&self) -> Vec<(StepId, Duration)> {
        self.engine.active_timers(self.clock.now())
    }

    /// Projection of the current and remaining steps from now.
    pub fn projection(&self) -> Vec<ProjectedStep> {
        project(
            self.sequencer.recipe(),
            self.sequencer.state(),
            self.sequencer.current_index(),
            self.clock.now(),
            &self.window,
        )
    }

    /// The user finished the current step's manual work.
    ///
    /// Starts its timer unless that timer is still running, the step has a
    /// future delayed start, or the remaining chain would finish outside the
    /// window. In the last case nothing changes and the caller must pass the
    /// report to [`Self::resolve_conflict`].
    pub fn complete_current_step(&mut self) -> Result<CompletionOutcome, SessionError> {
        let now = self.clock.now();
        self.process(now);
        let outcome = self.complete_at(now);
        self.finish_action(now);
        outcome
    }

    fn complete_at(&mut self, now: DateTime<Utc>) -> Result<CompletionOutcome, SessionError> {
        let index = self.sequencer.current_index();
        let Some(step) = self.sequencer.current_step().cloned() else {
            return Ok(CompletionOutcome::AlreadyFinished);
        };

        if self.engine.is_active(&step.id, now) {
            let remaining = self.engine.remaining(&step.id, now).unwrap_or_else(Duration::zero);
            debug!(step = %step.id, remaining = %remaining, "completion rejected, timer running");
            return Ok(CompletionOutcome::Rejected { index, remaining });
        }

        if let Some(starts_at) = self.sequencer.state().delayed_start(&step.id) {
            if starts_at > now {
                debug!(step = %step.id, start = %starts_at, "completion deferred");
                return Ok(CompletionOutcome::Deferred { index, starts_at });
            }
        }

        if step.is_timed() {
            if let Some(conflict) = detect_conflict(
                self.sequencer.recipe(),
                self.sequencer.state(),
                index,
                now,
                &self.window,
            ) {
                return Ok(CompletionOutcome::NeedsDecision(conflict));
            }
        }

        Ok(self.start_step(index, &step, now)?)
    }

    /// Start step `index` now: a timer for timed steps, an immediate
    /// advance for untimed ones.
    fn start_step(
        &mut self,
        index: usize,
        step: &Step,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, StoreError> {
        if !step.is_timed() {
            self.sequencer.mark_started(index);
            let next = self.sequencer.advance_from(index);
            info!(step = %step.id, "untimed step done");
            return Ok(CompletionOutcome::CompletedUntimed { index, next });
        }

        let payload = self.payload_for(index, step);
        let started = self.engine.start(&step.id, step.duration, &payload, now)?;
        self.sequencer.mark_started(index);
        Ok(CompletionOutcome::Started {
            index,
            end_time: started.record.end_time,
            notification_error: started.notification_error,
        })
    }

    fn payload_for(&self, index: usize, step: &Step) -> NotificationPayload {
        let recipe = self.sequencer.recipe();
        NotificationPayload {
            title: step.title.clone(),
            body: format!(
                "{}: step {} of {} is done",
                recipe.name(),
                index + 1,
                recipe.len()
            ),
        }
    }

    /// Apply the user's choice for a conflict returned by
    /// [`Self::complete_current_step`] or [`Self::schedule_completion_at`].
    ///
    /// A delay for a later step starts the current one immediately, unless
    /// the current step has a planned start still ahead; it then starts from
    /// [`Self::tick`] as planned. Every later step that would then miss the
    /// window is delayed automatically.
    pub fn resolve_conflict(
        &mut self,
        report: &ConflictReport,
        resolution: Resolution,
    ) -> Result<ResolutionOutcome, SessionError> {
        let now = self.clock.now();
        self.process(now);

        let current = self.sequencer.current_index();
        let Some(step) = self.sequencer.current_step().cloned() else {
            return Err(SessionError::Finished);
        };
        let conflict_step = self.sequencer.recipe().step(report.conflict_index).cloned();
        let stale = report.starting_index != current
            || self.engine.is_active(&step.id, now)
            || conflict_step.as_ref().map(|s| &s.id) != Some(&report.conflict_step_id);
        let Some(conflict_step) = conflict_step.filter(|_| !stale) else {
            return Err(SessionError::StaleDecision { current });
        };

        info!(step = %report.conflict_step_id, ?resolution, "conflict resolved");
        let mut outcome = ResolutionOutcome::default();
        let planned = self
            .sequencer
            .state()
            .delayed_start(&step.id)
            .filter(|starts_at| *starts_at > now);
        if let Some(starts_at) = planned {
            debug!(step = %step.id, start = %starts_at, "keeping planned start");
        }

        match report.delay_for(resolution) {
            None => {
                if planned.is_none() {
                    outcome.started = Some(self.start_step(current, &step, now)?);
                }
            }
            Some(delayed_start) => {
                if !report.is_immediate() && planned.is_none() {
                    outcome.started = Some(self.start_step(current, &step, now)?);
                }
                self.sequencer
                    .set_delayed_start(conflict_step.id.clone(), delayed_start);
                outcome.conflict_delay = Some((conflict_step.id.clone(), delayed_start));

                let cascade = auto_delay_future_steps(
                    self.sequencer.recipe(),
                    self.sequencer.state(),
                    report.conflict_index,
                    add_span(delayed_start, conflict_step.duration),
                    &self.window,
                );
                for (id, at) in &cascade.delayed {
                    self.sequencer.set_delayed_start(id.clone(), *at);
                }
                if !cascade.unresolved.is_empty() {
                    warn!(
                        steps = ?cascade.unresolved,
                        "steps cannot finish inside the cooking window"
                    );
                }
                outcome.cascade = cascade;
            }
        }

        self.finish_action(now);
        Ok(outcome)
    }

    /// Move the current step to `index`.
    ///
    /// Skipping forward abandons the steps in between and needs
    /// `confirmed`. Completed steps stay completed and no timer is
    /// cancelled.
    pub fn skip_to_step(
        &mut self,
        index: usize,
        confirmed: bool,
    ) -> Result<SkipOutcome, SessionError> {
        let len = self.sequencer.recipe().len();
        if index >= len {
            return Err(SessionError::StepOutOfRange { index, len });
        }

        let now = self.clock.now();
        self.process(now);

        let from = self.sequencer.current_index();
        if index > from && !confirmed {
            let abandoned = self
                .sequencer
                .recipe()
                .steps()
                .iter()
                .skip(from)
                .take(index - from)
                .map(|s| s.id.clone())
                .collect();
            return Ok(SkipOutcome::ConfirmationRequired { abandoned });
        }

        self.sequencer.skip_to(index);
        self.finish_action(now);
        Ok(SkipOutcome::Skipped { from, to: index })
    }

    /// Cancel every step's timer and reminder and erase the run.
    ///
    /// No save can land between the cancellations and the removal of the
    /// persisted run state.
    pub fn reset_recipe(&mut self) -> Result<(), SessionError> {
        let now = self.clock.now();
        self.sequencer.begin_reset();

        let ids: Vec<StepId> = self
            .sequencer
            .recipe()
            .steps()
            .iter()
            .map(|s| s.id.clone())
            .collect();
        let mut first_error = None;
        for id in &ids {
            if let Err(e) = self.engine.cancel(id) {
                warn!(step = %id, "cannot cancel timer during reset: {e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        let finished = self.sequencer.finish_reset();
        self.finished_while_away.clear();
        self.observe_phase(now);

        if let Some(e) = first_error {
            return Err(e.into());
        }
        finished.map_err(SessionError::from)
    }

    /// Plan the remaining steps so the last one finishes at `target`.
    ///
    /// The current step's start is delayed so the chain ends on time; later
    /// delays are dropped. The projection is returned with the first window
    /// conflict it contains, if any.
    pub fn schedule_completion_at(
        &mut self,
        target: DateTime<Utc>,
    ) -> Result<ScheduledCompletion, SessionError> {
        let now = self.clock.now();
        self.process(now);

        let index = self.sequencer.current_index();
        let Some(step) = self.sequencer.current_step().cloned() else {
            return Err(SessionError::Finished);
        };
        if self.engine.is_active(&step.id, now) {
            return Err(SessionError::StepInProgress { index });
        }

        let state = self.sequencer.state();
        let total = self
            .sequencer
            .recipe()
            .steps()
            .iter()
            .enumerate()
            .skip(index)
            .filter(|(i, s)| *i == index || !state.is_completed(&s.id))
            .try_fold(Duration::zero(), |sum, (_, s)| sum.checked_add(&s.duration))
            .ok_or(SessionError::TargetUnreachable {
                earliest: DateTime::<Utc>::MAX_UTC,
            })?;

        let start_at = sub_span(target, total);
        if start_at < now {
            return Err(SessionError::TargetUnreachable {
                earliest: add_span(now, total),
            });
        }

        self.sequencer.clear_delays_from(index);
        self.sequencer.set_delayed_start(step.id.clone(), start_at);

        let projection = project(
            self.sequencer.recipe(),
            self.sequencer.state(),
            index,
            now,
            &self.window,
        );
        let completion_at = projection.last().map_or(target, |p| p.completion);
        let conflict = detect_conflict(
            self.sequencer.recipe(),
            self.sequencer.state(),
            index,
            now,
            &self.window,
        );
        info!(
            step = %step.id,
            start = %start_at,
            completion = %completion_at,
            "completion scheduled"
        );

        self.finish_action(now);
        Ok(ScheduledCompletion {
            start_at,
            completion_at,
            projection,
            conflict,
        })
    }

    /// Periodic driver.
    ///
    /// Applies timer expiry, advances past the current step if its timer ran
    /// out in this tick, starts delayed steps that are due, and persists
    /// anything that changed. Failures are logged and retried next tick.
    pub fn tick(&mut self) -> TickReport {
        let now = self.clock.now();
        let report = self.process(now);
        self.finish_action(now);
        TickReport {
            phase: self.last_phase.clone(),
            ..report
        }
    }

    fn process(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport {
            now,
            expired: self.engine.reconcile(now),
            advanced_to: None,
            started: Vec::new(),
            notification_errors: Vec::new(),
            phase: self.last_phase.clone(),
        };

        let index = self.sequencer.current_index();
        let state = self.sequencer.state();
        let current_expired = self
            .sequencer
            .current_step()
            .is_some_and(|s| report.expired.contains(&s.id) && state.is_completed(&s.id));
        if current_expired {
            report.advanced_to = self.sequencer.advance_from(index);
        }

        for due in self.sequencer.take_due_delayed(now) {
            let Some(step) = self.sequencer.recipe().step(due).cloned() else {
                continue;
            };
            match self.start_step(due, &step, now) {
                Ok(CompletionOutcome::Started {
                    notification_error, ..
                }) => {
                    report.started.push(step.id.clone());
                    report.notification_errors.extend(notification_error);
                }
                Ok(CompletionOutcome::CompletedUntimed { next, .. }) => {
                    report.advanced_to = next.or(report.advanced_to);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(step = %step.id, "delayed start failed, will retry: {e}");
                    self.sequencer.set_delayed_start(step.id.clone(), now);
                }
            }
        }

        report
    }

    fn finish_action(&mut self, now: DateTime<Utc>) {
        self.flush_run_state();
        self.observe_phase(now);
    }

    fn flush_run_state(&mut self) {
        if let Err(e) = self.sequencer.flush() {
            warn!("cannot persist run state, will retry: {e}");
        }
    }

    fn observe_phase(&mut self, now: DateTime<Utc>) {
        let phase = self.sequencer.phase(&self.engine, now);
        if phase == self.last_phase {
            return;
        }
        debug!(from = ?self.last_phase, to = ?phase, "phase changed");
        self.history = self.history.record(PhaseTransition {
            from: self.last_phase.clone(),
            to: phase.clone(),
            at: now,
        });
        self.last_phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::notify::{InMemoryNotifier, NotificationError};
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, h, m, 0).unwrap()
    }

    fn recipe() -> Recipe {
        Recipe::builder("loaf", "Country loaf")
            .step("mix", "Mix", Duration::zero())
            .step("bulk", "Bulk ferment", Duration::hours(4))
            .step("shape", "Shape", Duration::minutes(30))
            .step("proof", "Cold proof", Duration::hours(10))
            .build()
            .unwrap()
    }

    type TestSession<'a> = RecipeSession<&'a ManualClock, MemoryStore, InMemoryNotifier>;

    fn open<'a>(
        clock: &'a ManualClock,
        store: &MemoryStore,
        notifier: &InMemoryNotifier,
    ) -> TestSession<'a> {
        RecipeSession::open(
            recipe(),
            clock,
            store.clone(),
            notifier.clone(),
            &Settings::default(),
        )
    }

    #[test]
    fn untimed_step_advances_immediately() {
        let clock = ManualClock::new(at(1, 7, 0));
        let notifier = InMemoryNotifier::new();
        let mut session = open(&clock, &MemoryStore::new(), &notifier);

        let outcome = session.complete_current_step().unwrap();

        assert_eq!(
            outcome,
            CompletionOutcome::CompletedUntimed {
                index: 0,
                next: Some(1)
            }
        );
        assert!(notifier.pending_ids().is_empty());
        assert_eq!(session.phase(), RunPhase::StepPending(1));
    }

    #[test]
    fn timed_step_schedules_reminder_for_end_time() {
        let clock = ManualClock::new(at(1, 7, 0));
        let notifier = InMemoryNotifier::new();
        let mut session = open(&clock, &MemoryStore::new(), &notifier);
        session.complete_current_step().unwrap();

        let outcome = session.complete_current_step().unwrap();

        assert!(matches!(
            outcome,
            CompletionOutcome::Started { index: 1, end_time, notification_error: None }
                if end_time == at(1, 11, 0)
        ));
        let pending = notifier.pending("bulk").unwrap();
        assert_eq!(pending.fire_at, at(1, 11, 0));
        assert_eq!(pending.payload.title, "Bulk ferment");
        assert!(pending.payload.body.contains("Country loaf"));
    }

    #[test]
    fn premature_completion_is_rejected() {
        let clock = ManualClock::new(at(1, 7, 0));
        let mut session = open(&clock, &MemoryStore::new(), &InMemoryNotifier::new());
        session.complete_current_step().unwrap();
        session.complete_current_step().unwrap();

        clock.advance(Duration::hours(1));
        let outcome = session.complete_current_step().unwrap();

        assert_eq!(
            outcome,
            CompletionOutcome::Rejected {
                index: 1,
                remaining: Duration::hours(3)
            }
        );
        assert_eq!(session.current_index(), 1);
    }

    #[test]
    fn tick_advances_once_when_timer_runs_out() {
        let clock = ManualClock::new(at(1, 7, 0));
        let mut session = open(&clock, &MemoryStore::new(), &InMemoryNotifier::new());
        session.complete_current_step().unwrap();
        session.complete_current_step().unwrap();

        clock.set(at(1, 11, 0));
        assert_eq!(
            session.phase(),
            RunPhase::StepTimerExpiredAwaitingAdvance(1)
        );

        let report = session.tick();
        assert_eq!(report.expired, vec![StepId::new("bulk")]);
        assert_eq!(report.advanced_to, Some(2));
        assert_eq!(report.phase, RunPhase::StepPending(2));

        let again = session.tick();
        assert!(again.expired.is_empty());
        assert_eq!(again.advanced_to, None);
        assert_eq!(session.current_index(), 2);
    }

    #[test]
    fn notification_failure_still_starts_timer() {
        let clock = ManualClock::new(at(1, 7, 0));
        let notifier = InMemoryNotifier::new();
        notifier.fail_with(Some(NotificationError::Unavailable("denied".into())));
        let mut session = open(&clock, &MemoryStore::new(), &notifier);
        session.complete_current_step().unwrap();

        let outcome = session.complete_current_step().unwrap();

        assert!(matches!(
            outcome,
            CompletionOutcome::Started {
                notification_error: Some(NotificationError::Unavailable(_)),
                ..
            }
        ));
        assert_eq!(session.phase(), RunPhase::StepTimerRunning(1));
    }

    #[test]
    fn conflict_needs_decision_and_changes_nothing() {
        let clock = ManualClock::new(at(1, 14, 0));
        let store = MemoryStore::new();
        let mut session = open(&clock, &store, &InMemoryNotifier::new());
        session.skip_to_step(3, true).unwrap();

        let outcome = session.complete_current_step().unwrap();

        let CompletionOutcome::NeedsDecision(report) = outcome else {
            panic!("expected a conflict, got {outcome:?}");
        };
        assert_eq!(report.conflict_index, 3);
        assert!(session.engine().record(&"proof".into()).is_none());
        assert_eq!(session.phase(), RunPhase::StepPending(3));
    }

    #[test]
    fn delay_to_next_window_starts_from_tick() {
        let clock = ManualClock::new(at(1, 14, 0));
        let mut session = open(&clock, &MemoryStore::new(), &InMemoryNotifier::new());
        session.skip_to_step(3, true).unwrap();
        let CompletionOutcome::NeedsDecision(report) = session.complete_current_step().unwrap()
        else {
            panic!("expected a conflict");
        };

        let outcome = session
            .resolve_conflict(&report, Resolution::DelayToNextWindow)
            .unwrap();
        assert_eq!(outcome.started, None);
        assert_eq!(outcome.conflict_delay, Some(("proof".into(), at(2, 6, 0))));

        assert_eq!(
            session.complete_current_step().unwrap(),
            CompletionOutcome::Deferred {
                index: 3,
                starts_at: at(2, 6, 0)
            }
        );

        clock.set(at(2, 6, 0));
        let report = session.tick();
        assert_eq!(report.started, vec![StepId::new("proof")]);
        assert_eq!(
            session.engine().record(&"proof".into()).unwrap().end_time,
            at(2, 16, 0)
        );
    }

    #[test]
    fn later_conflict_starts_current_step_and_delays_the_violator() {
        // bulk ends 19:00 and shape 19:30, both inside; proof would end 05:30
        let clock = ManualClock::new(at(1, 15, 0));
        let mut session = RecipeSession::open_with(
            recipe(),
            &clock,
            MemoryStore::new(),
            InMemoryNotifier::new(),
            CookingWindow::new(6 * 60, 21 * 60),
            Codec::Json,
        );
        session.complete_current_step().unwrap();

        let CompletionOutcome::NeedsDecision(report) = session.complete_current_step().unwrap()
        else {
            panic!("expected a conflict");
        };
        assert_eq!(report.starting_index, 1);
        assert_eq!(report.conflict_index, 3);

        let outcome = session
            .resolve_conflict(&report, Resolution::DelayToNextWindow)
            .unwrap();

        assert!(matches!(
            outcome.started,
            Some(CompletionOutcome::Started { index: 1, .. })
        ));
        assert_eq!(outcome.conflict_delay, Some(("proof".into(), at(2, 6, 0))));
        assert_eq!(session.phase(), RunPhase::StepTimerRunning(1));
    }

    #[test]
    fn start_anyway_on_own_conflict_starts_without_delay() {
        let clock = ManualClock::new(at(1, 14, 0));
        let notifier = InMemoryNotifier::new();
        let mut session = open(&clock, &MemoryStore::new(), &notifier);
        session.skip_to_step(3, true).unwrap();
        let CompletionOutcome::NeedsDecision(report) = session.complete_current_step().unwrap()
        else {
            panic!("expected a conflict");
        };
        assert!(report.is_immediate());

        let outcome = session
            .resolve_conflict(&report, Resolution::StartAnyway)
            .unwrap();

        assert!(matches!(
            outcome.started,
            Some(CompletionOutcome::Started { index: 3, end_time, .. }) if end_time == at(2, 0, 0)
        ));
        assert_eq!(outcome.conflict_delay, None);
        assert!(session.run_state().delayed_starts.is_empty());
        assert_eq!(notifier.pending("proof").unwrap().fire_at, at(2, 0, 0));
    }

    #[test]
    fn start_anyway_on_later_conflict_asks_again_when_it_is_reached() {
        let clock = ManualClock::new(at(1, 15, 0));
        let mut session = RecipeSession::open_with(
            recipe(),
            &clock,
            MemoryStore::new(),
            InMemoryNotifier::new(),
            CookingWindow::new(6 * 60, 21 * 60),
            Codec::Json,
        );
        session.complete_current_step().unwrap();
        let CompletionOutcome::NeedsDecision(report) = session.complete_current_step().unwrap()
        else {
            panic!("expected a conflict");
        };
        assert_eq!(report.conflict_index, 3);

        let outcome = session
            .resolve_conflict(&report, Resolution::StartAnyway)
            .unwrap();
        assert!(matches!(
            outcome.started,
            Some(CompletionOutcome::Started { index: 1, .. })
        ));
        assert!(session.run_state().delayed_starts.is_empty());

        clock.set(at(1, 19, 0));
        session.tick();
        let CompletionOutcome::NeedsDecision(report) = session.complete_current_step().unwrap()
        else {
            panic!("shape should still lead into the proof conflict");
        };
        session
            .resolve_conflict(&report, Resolution::StartAnyway)
            .unwrap();

        clock.set(at(1, 19, 30));
        session.tick();
        assert_eq!(session.current_index(), 3);
        let outcome = session.complete_current_step().unwrap();
        assert!(matches!(
            outcome,
            CompletionOutcome::NeedsDecision(ref r)
                if r.starting_index == 3 && r.conflict_index == 3
                    && r.projected_completion == at(2, 5, 30)
        ));
    }

    #[test]
    fn start_anyway_keeps_a_planned_start() {
        let clock = ManualClock::new(at(1, 7, 0));
        let notifier = InMemoryNotifier::new();
        let mut session = open(&clock, &MemoryStore::new(), &notifier);
        session.complete_current_step().unwrap();

        // proof would run 13:00 to 23:00 on day 2
        let planned = session.schedule_completion_at(at(2, 23, 0)).unwrap();
        assert_eq!(planned.start_at, at(2, 8, 30));
        let report = planned.conflict.unwrap();
        assert_eq!(report.conflict_index, 3);

        let outcome = session
            .resolve_conflict(&report, Resolution::StartAnyway)
            .unwrap();

        assert_eq!(outcome.started, None);
        assert!(session.engine().record(&"bulk".into()).is_none());
        assert!(notifier.pending_ids().is_empty());
        assert_eq!(
            session.run_state().delayed_start(&"bulk".into()),
            Some(at(2, 8, 30))
        );
    }

    #[test]
    fn delaying_a_later_step_keeps_a_planned_start() {
        let clock = ManualClock::new(at(1, 7, 0));
        let mut session = open(&clock, &MemoryStore::new(), &InMemoryNotifier::new());
        session.complete_current_step().unwrap();
        let report = session
            .schedule_completion_at(at(2, 23, 0))
            .unwrap()
            .conflict
            .unwrap();

        let outcome = session
            .resolve_conflict(&report, Resolution::DelayToNextWindow)
            .unwrap();

        assert_eq!(outcome.started, None);
        assert_eq!(outcome.conflict_delay, Some(("proof".into(), at(3, 6, 0))));
        assert_eq!(
            session.run_state().delayed_start(&"bulk".into()),
            Some(at(2, 8, 30))
        );

        clock.set(at(2, 8, 30));
        let tick = session.tick();
        assert_eq!(tick.started, vec![StepId::new("bulk")]);
        assert_eq!(
            session.engine().record(&"bulk".into()).unwrap().end_time,
            at(2, 12, 30)
        );
        assert_eq!(
            session.run_state().delayed_start(&"proof".into()),
            Some(at(3, 6, 0))
        );
    }

    #[test]
    fn stale_decision_is_refused() {
        let clock = ManualClock::new(at(1, 14, 0));
        let mut session = open(&clock, &MemoryStore::new(), &InMemoryNotifier::new());
        session.skip_to_step(3, true).unwrap();
        let CompletionOutcome::NeedsDecision(report) = session.complete_current_step().unwrap()
        else {
            panic!("expected a conflict");
        };

        session.skip_to_step(1, false).unwrap();
        let result = session.resolve_conflict(&report, Resolution::StartAnyway);

        assert!(matches!(
            result,
            Err(SessionError::StaleDecision { current: 1 })
        ));
    }

    #[test]
    fn forward_skip_needs_confirmation() {
        let clock = ManualClock::new(at(1, 7, 0));
        let mut session = open(&clock, &MemoryStore::new(), &InMemoryNotifier::new());

        let outcome = session.skip_to_step(2, false).unwrap();
        assert_eq!(
            outcome,
            SkipOutcome::ConfirmationRequired {
                abandoned: vec!["mix".into(), "bulk".into()]
            }
        );
        assert_eq!(session.current_index(), 0);

        assert!(matches!(
            session.skip_to_step(4, true),
            Err(SessionError::StepOutOfRange { index: 4, len: 4 })
        ));
    }

    #[test]
    fn reset_cancels_reminders_and_forgets_run() {
        let clock = ManualClock::new(at(1, 7, 0));
        let store = MemoryStore::new();
        let notifier = InMemoryNotifier::new();
        let mut session = open(&clock, &store, &notifier);
        session.complete_current_step().unwrap();
        session.complete_current_step().unwrap();

        session.reset_recipe().unwrap();

        assert!(notifier.pending_ids().is_empty());
        assert!(notifier.cancelled().contains(&"proof".to_string()));
        assert_eq!(session.phase(), RunPhase::NotStarted);
        assert!(!store.contains(&crate::sequencer::run_state_key(&recipe())));
        assert!(session.active_timers().is_empty());
    }

    #[test]
    fn schedule_completion_plans_backwards() {
        let clock = ManualClock::new(at(1, 7, 0));
        let mut session = open(&clock, &MemoryStore::new(), &InMemoryNotifier::new());
        session.complete_current_step().unwrap();

        // bulk 4h + shape 30m + proof 10h = 14h30m before 18:00 next day
        let planned = session.schedule_completion_at(at(2, 18, 0)).unwrap();

        assert_eq!(planned.start_at, at(2, 3, 30));
        assert_eq!(planned.completion_at, at(2, 18, 0));
        assert_eq!(planned.projection.len(), 3);
        assert!(planned.conflict.is_none());
        assert_eq!(
            session.run_state().delayed_start(&"bulk".into()),
            Some(at(2, 3, 30))
        );
    }

    #[test]
    fn schedule_completion_rejects_unreachable_target() {
        let clock = ManualClock::new(at(1, 7, 0));
        let mut session = open(&clock, &MemoryStore::new(), &InMemoryNotifier::new());
        session.complete_current_step().unwrap();

        let result = session.schedule_completion_at(at(1, 12, 0));
        assert!(matches!(
            result,
            Err(SessionError::TargetUnreachable { earliest }) if earliest == at(1, 21, 30)
        ));

        session.complete_current_step().unwrap();
        assert!(matches!(
            session.schedule_completion_at(at(3, 12, 0)),
            Err(SessionError::StepInProgress { index: 1 })
        ));
    }

    #[test]
    fn schedule_completion_with_overflowing_durations_is_unreachable() {
        let huge = Duration::seconds(i64::MAX / 1000);
        let recipe = Recipe::builder("aged", "Aged")
            .step("cure", "Cure", huge)
            .step("rest", "Rest", huge)
            .build()
            .unwrap();
        let clock = ManualClock::new(at(1, 7, 0));
        let mut session = RecipeSession::open(
            recipe,
            &clock,
            MemoryStore::new(),
            InMemoryNotifier::new(),
            &Settings::default(),
        );

        let result = session.schedule_completion_at(at(2, 18, 0));

        assert!(matches!(
            result,
            Err(SessionError::TargetUnreachable { earliest }) if earliest == DateTime::<Utc>::MAX_UTC
        ));
        assert!(session.run_state().delayed_starts.is_empty());
    }

    #[test]
    fn history_records_phase_changes() {
        let clock = ManualClock::new(at(1, 7, 0));
        let mut session = open(&clock, &MemoryStore::new(), &InMemoryNotifier::new());
        session.complete_current_step().unwrap();
        session.complete_current_step().unwrap();
        clock.set(at(1, 11, 0));
        session.tick();

        assert_eq!(
            session.history().path(),
            vec![
                &RunPhase::NotStarted,
                &RunPhase::StepPending(1),
                &RunPhase::StepTimerRunning(1),
                &RunPhase::StepPending(2),
            ]
        );
    }
}
