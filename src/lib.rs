//! Leaven: a scheduling core for multi-step recipes with long waits
//!
//! A recipe is an ordered list of steps. Each step is some manual work
//! followed by an optional timed wait (fermenting, proofing, resting).
//! Leaven keeps the wait timers durable across process restarts, moves the
//! run from step to step as timers finish, and keeps completions inside a
//! daily cooking window by offering to delay steps that would finish at
//! night.
//!
//! # Core Concepts
//!
//! - **Timers**: one durable record per step, reconciled against the clock
//! - **Sequencer**: the run's current step, recomputed from timers on resume
//! - **Window**: the daily interval in which a step may finish
//! - **Conflicts**: projected window violations and the delays that fix them
//! - **Session**: one recipe instance tying these together behind a clock
//!
//! All time comes from a [`Clock`], so the whole core can be driven by a
//! [`ManualClock`] in tests.
//!
//! # Example
//!
//! ```rust
//! use leaven::{CookingWindow, Recipe};
//! use leaven::conflict::{detect_conflict, Resolution};
//! use leaven::sequencer::RecipeRunState;
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let recipe = Recipe::builder("focaccia", "Focaccia")
//!     .step("rise", "Overnight rise", Duration::hours(12))
//!     .build()
//!     .unwrap();
//! let window = CookingWindow::new(6 * 60, 22 * 60);
//! let now = Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap();
//!
//! let conflict = detect_conflict(&recipe, &RecipeRunState::default(), 0, now, &window).unwrap();
//! let start = conflict.delay_for(Resolution::DelayToNextWindow).unwrap();
//! assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 2, 6, 0, 0).unwrap());
//! ```

pub mod checkpoint;
pub mod config;
pub mod conflict;
pub mod core;
pub mod notify;
pub mod recipe;
pub mod sequencer;
pub mod session;
pub mod store;
pub mod timer;
pub mod window;

// Re-export commonly used types
pub use config::Settings;
pub use core::{Clock, ManualClock, SystemClock};
pub use recipe::{Recipe, Step, StepId};
pub use session::{RecipeSession, SessionError};
pub use window::CookingWindow;
