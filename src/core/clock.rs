//! Time sources and span arithmetic.
//!
//! Every "now" read in the crate goes through a [`Clock`] so tests can pin
//! or advance time deterministically.

use chrono::{DateTime, Duration, Utc};
use std::cell::Cell;

/// Source of the current instant.
pub trait Clock {
    /// Current wall-clock instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations.
///
/// # Example
///
/// ```rust
/// use leaven::core::{Clock, ManualClock};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let start = Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap();
/// let clock = ManualClock::new(start);
/// clock.advance(Duration::seconds(10));
///
/// assert_eq!(clock.now(), start + Duration::seconds(10));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    time: Cell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Cell::new(time),
        }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        self.time.set(time);
    }

    pub fn advance(&self, by: Duration) {
        self.time.set(add_span(self.time.get(), by));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.time.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Add a span to an instant, saturating at the representable bounds.
pub fn add_span(instant: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    instant.checked_add_signed(span).unwrap_or(if span < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Subtract a span from an instant, saturating at the representable bounds.
pub fn sub_span(instant: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    instant.checked_sub_signed(span).unwrap_or(if span < Duration::zero() {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    })
}

/// `max(0, end - now)`.
pub fn remaining_until(end: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let left = end.signed_duration_since(now);
    if left < Duration::zero() {
        Duration::zero()
    } else {
        left
    }
}
