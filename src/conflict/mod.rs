//! Cooking-window conflict detection and resolution.
//!
//! Before a step's timer starts, the chain of remaining steps is projected
//! forward. The first step that would finish outside the window is reported
//! together with the data for each [`Resolution`]. Once the user picks a
//! delay, later violators are delayed automatically by
//! [`auto_delay_future_steps`] without asking again.

mod projection;
mod resolver;

pub use projection::{first_violation, project, ProjectedStep};
pub use resolver::{
    auto_delay_future_steps, detect_conflict, CascadeReport, ConflictReport, Resolution,
};
