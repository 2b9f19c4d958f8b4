//! Daily cooking window configuration.
//!
//! A [`CookingWindow`] is the time-of-day interval during which a step is
//! allowed to *finish*. The scheduling functions over it live in [`policy`].

pub mod policy;

use chrono::{FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Minutes in a day. As `latest` it means "open-ended until midnight".
pub const MINUTES_PER_DAY: u16 = 1440;

/// Persisted pair of minute-of-day bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub earliest_minute: u16,
    pub latest_minute: u16,
}

impl Default for WindowBounds {
    fn default() -> Self {
        Self {
            earliest_minute: 6 * 60,
            latest_minute: 22 * 60,
        }
    }
}

/// Allowed completion interval, evaluated in a fixed local offset.
///
/// # Example
///
/// ```rust
/// use leaven::window::CookingWindow;
///
/// // latest <= earliest is corrected to earliest + 1
/// let window = CookingWindow::new(600, 300);
/// assert_eq!(window.earliest_minute(), 600);
/// assert_eq!(window.latest_minute(), 601);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CookingWindow {
    earliest_minute: u16,
    latest_minute: u16,
    offset: FixedOffset,
}

impl Default for CookingWindow {
    fn default() -> Self {
        Self::from_bounds(WindowBounds::default())
    }
}

impl CookingWindow {
    /// Window evaluated in UTC.
    ///
    /// Out-of-range input is clamped and `latest <= earliest` is silently
    /// pushed to `earliest + 1`.
    pub fn new(earliest_minute: u16, latest_minute: u16) -> Self {
        let earliest = earliest_minute.min(MINUTES_PER_DAY - 1);
        let mut latest = latest_minute.min(MINUTES_PER_DAY);
        if latest <= earliest {
            warn!(
                earliest,
                latest, "cooking window ends before it starts, moving end to earliest + 1"
            );
            latest = earliest + 1;
        }
        Self {
            earliest_minute: earliest,
            latest_minute: latest,
            offset: Utc.fix(),
        }
    }

    pub fn from_bounds(bounds: WindowBounds) -> Self {
        Self::new(bounds.earliest_minute, bounds.latest_minute)
    }

    /// Evaluate minute-of-day in the given local offset.
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn earliest_minute(&self) -> u16 {
        self.earliest_minute
    }

    pub fn latest_minute(&self) -> u16 {
        self.latest_minute
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// True when the window runs to midnight with no same-day upper bound.
    pub fn is_open_ended(&self) -> bool {
        self.latest_minute >= MINUTES_PER_DAY
    }

    pub fn bounds(&self) -> WindowBounds {
        WindowBounds {
            earliest_minute: self.earliest_minute,
            latest_minute: self.latest_minute,
        }
    }

    pub(crate) fn local_to_utc(&self, local: NaiveDateTime) -> chrono::DateTime<Utc> {
        let shifted = local
            .checked_sub_signed(chrono::Duration::seconds(i64::from(
                self.offset.local_minus_utc(),
            )))
            .unwrap_or(local);
        Utc.from_utc_datetime(&shifted)
    }
}
