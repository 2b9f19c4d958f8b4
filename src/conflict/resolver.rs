//! Conflict detection, resolution choices, and delay cascading.

use super::projection::{first_violation, project, ProjectedStep};
use crate::core::{add_span, sub_span};
use crate::recipe::{Recipe, StepId};
use crate::sequencer::RecipeRunState;
use crate::window::CookingWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the user chose to handle a detected conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Ignore the window and start now.
    StartAnyway,
    /// Delay the conflicting step so it finishes at the end of its window.
    StartLater,
    /// Delay the conflicting step to the next window opening.
    DelayToNextWindow,
}

/// A step about to start whose chain would finish outside the window, with
/// the data each resolution needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    /// Step whose timer was about to start.
    pub starting_index: usize,
    /// First step projected to finish outside the window.
    pub conflict_index: usize,
    pub conflict_step_id: StepId,
    pub projected_start: DateTime<Utc>,
    pub projected_completion: DateTime<Utc>,
    /// Start chosen by [`Resolution::StartLater`].
    pub start_later_at: DateTime<Utc>,
    /// Start chosen by [`Resolution::DelayToNextWindow`].
    pub next_window_at: DateTime<Utc>,
    /// When the report was computed.
    pub detected_at: DateTime<Utc>,
    pub projection: Vec<ProjectedStep>,
}

impl ConflictReport {
    /// Delayed start a resolution records for the conflict step, if any.
    pub fn delay_for(&self, resolution: Resolution) -> Option<DateTime<Utc>> {
        match resolution {
            Resolution::StartAnyway => None,
            Resolution::StartLater => Some(self.start_later_at),
            Resolution::DelayToNextWindow => Some(self.next_window_at),
        }
    }

    /// Whether the conflict is on the step being started itself.
    pub fn is_immediate(&self) -> bool {
        self.conflict_index == self.starting_index
    }
}

/// Project from step `starting` and report the first window violation.
///
/// # Example
///
/// ```rust
/// use leaven::conflict::detect_conflict;
/// use leaven::recipe::Recipe;
/// use leaven::sequencer::RecipeRunState;
/// use leaven::window::CookingWindow;
/// use chrono::{Duration, TimeZone, Utc};
///
/// let recipe = Recipe::builder("loaf", "Loaf")
///     .step("proof", "Overnight proof", Duration::hours(12))
///     .build()
///     .unwrap();
/// let window = CookingWindow::new(6 * 60, 22 * 60);
/// let now = Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap();
///
/// let report = detect_conflict(&recipe, &RecipeRunState::default(), 0, now, &window).unwrap();
/// assert_eq!(report.conflict_index, 0);
/// assert_eq!(report.next_window_at, Utc.with_ymd_and_hms(2024, 3, 2, 6, 0, 0).unwrap());
/// ```
pub fn detect_conflict(
    recipe: &Recipe,
    state: &RecipeRunState,
    starting: usize,
    now: DateTime<Utc>,
    window: &CookingWindow,
) -> Option<ConflictReport> {
    let projection = project(recipe, state, starting, now, window);
    let conflict = first_violation(&projection)?.clone();
    let duration = recipe.step(conflict.index)?.duration;

    debug!(
        step = %conflict.step_id,
        completion = %conflict.completion,
        "projected completion outside cooking window"
    );

    Some(ConflictReport {
        starting_index: starting,
        conflict_index: conflict.index,
        conflict_step_id: conflict.step_id,
        projected_start: conflict.start,
        projected_completion: conflict.completion,
        start_later_at: window.earliest_legal_start(conflict.completion, duration, conflict.start),
        next_window_at: window.next_window_start(conflict.start),
        detected_at: now,
        projection,
    })
}

/// Delays decided by [`auto_delay_future_steps`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Steps given a new delayed start, in order.
    pub delayed: Vec<(StepId, DateTime<Utc>)>,
    /// Steps that cannot finish inside the window from any start; they keep
    /// their natural schedule and must be shown to the user.
    pub unresolved: Vec<StepId>,
}

/// Walk the steps after `resolved` and delay every one whose projected
/// completion would fall outside the window.
///
/// `resolved_completion` is when the resolved step now finishes. Each
/// violating step is moved to the next window opening after it could start.
/// A step longer than the window can still miss from there; it is then
/// shifted to finish exactly when the following window opens.
pub fn auto_delay_future_steps(
    recipe: &Recipe,
    state: &RecipeRunState,
    resolved: usize,
    resolved_completion: DateTime<Utc>,
    window: &CookingWindow,
) -> CascadeReport {
    let mut report = CascadeReport::default();
    let mut current_time = resolved_completion;

    for step in recipe.steps().iter().skip(resolved + 1) {
        if state.is_completed(&step.id) {
            continue;
        }

        let start = state
            .delayed_start(&step.id)
            .map_or(current_time, |delayed| delayed.max(current_time));
        let natural = add_span(start, step.duration);

        if !step.is_timed() || window.is_within_window(natural) {
            current_time = natural;
            continue;
        }

        let next_window = window.next_window_start(start);
        let fallback = sub_span(
            window.next_window_start(add_span(next_window, step.duration)),
            step.duration,
        );
        let chosen = [next_window, fallback]
            .into_iter()
            .find(|candidate| window.is_within_window(add_span(*candidate, step.duration)));

        match chosen {
            Some(delayed_start) => {
                debug!(step = %step.id, start = %delayed_start, "cascaded delay");
                report.delayed.push((step.id.clone(), delayed_start));
                current_time = add_span(delayed_start, step.duration);
            }
            None => {
                debug!(step = %step.id, "no start keeps step inside the window");
                report.unresolved.push(step.id.clone());
                current_time = natural;
            }
        }
    }

    report
}
