//! Durable per-step timers.
//!
//! A [`StepTimerRecord`] survives process restarts through the store; the
//! [`TimerEngine`] is its only writer and also requests the matching
//! reminder from the notification port.

mod engine;
mod record;

pub use engine::{LoadReport, TimerEngine, TimerStart, TIMERS_KEY};
pub use record::StepTimerRecord;
