//! Results of session operations.

use crate::conflict::{CascadeReport, ConflictReport, ProjectedStep};
use crate::notify::NotificationError;
use crate::recipe::StepId;
use crate::sequencer::RunPhase;
use chrono::{DateTime, Duration, Utc};

/// Result of [`RecipeSession::complete_current_step`](super::RecipeSession::complete_current_step).
#[derive(Clone, Debug, PartialEq)]
pub enum CompletionOutcome {
    /// The step's timer started.
    Started {
        index: usize,
        end_time: DateTime<Utc>,
        /// Reminder could not be scheduled; the timer runs regardless.
        notification_error: Option<NotificationError>,
    },
    /// A step without a wait was done; `next` is the new current index.
    CompletedUntimed { index: usize, next: Option<usize> },
    /// The step has a delayed start; its timer begins on its own at `starts_at`.
    Deferred {
        index: usize,
        starts_at: DateTime<Utc>,
    },
    /// Starting now would finish outside the window; nothing was changed.
    NeedsDecision(ConflictReport),
    /// The step's timer is still running; nothing was changed.
    Rejected { index: usize, remaining: Duration },
    AlreadyFinished,
}

/// Result of [`RecipeSession::resolve_conflict`](super::RecipeSession::resolve_conflict).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolutionOutcome {
    /// Set when the starting step's timer (or untimed step) was started.
    pub started: Option<CompletionOutcome>,
    /// Delay recorded for the conflict step itself.
    pub conflict_delay: Option<(StepId, DateTime<Utc>)>,
    /// Delays applied to later steps without asking again.
    pub cascade: CascadeReport,
}

/// Result of [`RecipeSession::skip_to_step`](super::RecipeSession::skip_to_step).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped { from: usize, to: usize },
    /// Forward skip needs confirmation; these steps would be abandoned.
    ConfirmationRequired { abandoned: Vec<StepId> },
}

/// Result of [`RecipeSession::schedule_completion_at`](super::RecipeSession::schedule_completion_at).
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledCompletion {
    /// When the current step's timer will start.
    pub start_at: DateTime<Utc>,
    pub completion_at: DateTime<Utc>,
    pub projection: Vec<ProjectedStep>,
    /// First window violation in the planned chain, if any.
    pub conflict: Option<ConflictReport>,
}

/// What one tick did.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub now: DateTime<Utc>,
    /// Timers flipped inactive by this tick.
    pub expired: Vec<StepId>,
    /// New current index if the run advanced.
    pub advanced_to: Option<usize>,
    /// Delayed steps whose timers started.
    pub started: Vec<StepId>,
    pub notification_errors: Vec<NotificationError>,
    pub phase: RunPhase,
}
