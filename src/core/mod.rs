//! Core building blocks shared by every component.
//!
//! This module contains:
//! - The injectable `Clock` and span arithmetic
//! - The `State` trait implemented by run phases
//! - Immutable phase history tracking
//!
//! Nothing here performs I/O.

mod clock;
mod history;
mod state;

pub use clock::{add_span, remaining_until, sub_span, Clock, ManualClock, SystemClock};
pub use history::{PhaseHistory, PhaseTransition};
pub use state::State;
