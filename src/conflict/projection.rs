//! Forward projection of step start and completion times.

use crate::core::add_span;
use crate::recipe::{Recipe, StepId};
use crate::sequencer::RecipeRunState;
use crate::window::CookingWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Projected timing of one step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedStep {
    pub index: usize,
    pub step_id: StepId,
    pub start: DateTime<Utc>,
    pub completion: DateTime<Utc>,
    /// Whether the step has a wait at all; untimed steps are never in conflict.
    pub timed: bool,
    pub within_window: bool,
}

impl ProjectedStep {
    pub fn violates(&self) -> bool {
        self.timed && !self.within_window
    }
}

/// Project step `from` starting at `now`, then every later step that is not
/// completed yet, in order.
///
/// Each step starts when its predecessor completes, or at its recorded
/// delayed start if that is later.
pub fn project(
    recipe: &Recipe,
    state: &RecipeRunState,
    from: usize,
    now: DateTime<Utc>,
    window: &CookingWindow,
) -> Vec<ProjectedStep> {
    let mut projection = Vec::new();
    let mut cursor = now;

    for (index, step) in recipe.steps().iter().enumerate().skip(from) {
        if index > from && state.is_completed(&step.id) {
            continue;
        }
        let start = state
            .delayed_start(&step.id)
            .map_or(cursor, |delayed| delayed.max(cursor));
        let completion = add_span(start, step.duration);
        projection.push(ProjectedStep {
            index,
            step_id: step.id.clone(),
            start,
            completion,
            timed: step.is_timed(),
            within_window: window.is_within_window(completion),
        });
        cursor = completion;
    }

    projection
}

/// First step in the projection whose completion falls outside the window.
pub fn first_violation(projection: &[ProjectedStep]) -> Option<&ProjectedStep> {
    projection.iter().find(|p| p.violates())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, h, 0, 0).unwrap()
    }

    fn recipe() -> Recipe {
        Recipe::builder("loaf", "Loaf")
            .step("levain", "Build levain", Duration::hours(1))
            .step("shape", "Shape", Duration::zero())
            .step("proof", "Cold proof", Duration::hours(10))
            .build()
            .unwrap()
    }

    fn window() -> CookingWindow {
        CookingWindow::new(6 * 60, 22 * 60)
    }

    #[test]
    fn projection_chains_completions() {
        let state = RecipeRunState::default();
        let projection = project(&recipe(), &state, 0, at(1, 20), &window());

        let completions: Vec<_> = projection.iter().map(|p| p.completion).collect();
        assert_eq!(completions, vec![at(1, 21), at(1, 21), at(2, 7)]);
        assert!(first_violation(&projection).is_none());
    }

    #[test]
    fn delayed_start_pushes_later_steps() {
        let mut state = RecipeRunState::default();
        state.delayed_starts.insert("proof".into(), at(2, 6));

        let projection = project(&recipe(), &state, 0, at(1, 20), &window());
        assert_eq!(projection[2].start, at(2, 6));
        assert_eq!(projection[2].completion, at(2, 16));
    }

    #[test]
    fn completed_later_steps_are_skipped() {
        let mut state = RecipeRunState::default();
        state.completed_step_ids.insert("shape".into());

        let projection = project(&recipe(), &state, 0, at(1, 20), &window());
        let ids: Vec<_> = projection.iter().map(|p| p.step_id.as_str()).collect();
        assert_eq!(ids, vec!["levain", "proof"]);
    }

    #[test]
    fn untimed_steps_never_violate() {
        let state = RecipeRunState::default();
        let projection = project(&recipe(), &state, 0, at(1, 22), &window());

        // levain ends 23:00 and is flagged; shape shares the instant but has no wait
        assert!(projection[0].violates());
        assert!(!projection[1].within_window);
        assert!(!projection[1].violates());
        assert_eq!(first_violation(&projection).unwrap().index, 0);
    }
}
