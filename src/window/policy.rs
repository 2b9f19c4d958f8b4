//! Pure scheduling functions over a [`CookingWindow`].
//!
//! All minute-of-day arithmetic is integer. Bounds are inclusive except when
//! `latest` is the midnight sentinel, which makes the range `[earliest, 1440)`.

use super::{CookingWindow, MINUTES_PER_DAY};
use crate::core::sub_span;
use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, Timelike, Utc};

impl CookingWindow {
    /// Minute of the local day, `0..1440`.
    pub fn minute_of_day(&self, instant: DateTime<Utc>) -> u16 {
        let local = instant.with_timezone(&self.offset);
        // hour <= 23 and minute <= 59, so this always fits
        (local.hour() * 60 + local.minute()) as u16
    }

    /// Whether `instant` falls inside the allowed completion interval.
    ///
    /// # Example
    ///
    /// ```rust
    /// use leaven::window::CookingWindow;
    /// use chrono::{TimeZone, Utc};
    ///
    /// let window = CookingWindow::new(6 * 60, 22 * 60);
    /// let late = Utc.with_ymd_and_hms(2024, 3, 2, 2, 0, 0).unwrap();
    /// let evening = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();
    ///
    /// assert!(!window.is_within_window(late));
    /// assert!(window.is_within_window(evening));
    /// ```
    pub fn is_within_window(&self, instant: DateTime<Utc>) -> bool {
        let minute = self.minute_of_day(instant);
        if self.is_open_ended() {
            minute >= self.earliest_minute && minute < MINUTES_PER_DAY
        } else {
            minute >= self.earliest_minute && minute <= self.latest_minute
        }
    }

    /// Today's window start if it is not before `from`, otherwise tomorrow's.
    pub fn next_window_start(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let day = from.with_timezone(&self.offset).date_naive();
        let today = self.window_start_on(day);
        if today >= from {
            return today;
        }
        match day.checked_add_days(Days::new(1)) {
            Some(tomorrow) => self.window_start_on(tomorrow),
            None => from,
        }
    }

    /// Start instant for a task whose projected completion falls outside the
    /// window.
    ///
    /// Returns `now` when `projected_completion` is already allowed. Otherwise
    /// the task is placed so it finishes at the window's end on the completion
    /// day, but never before `now` and never before the next window opens.
    pub fn earliest_legal_start(
        &self,
        projected_completion: DateTime<Utc>,
        task_duration: Duration,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        if self.is_within_window(projected_completion) {
            return now;
        }
        let completion_day = projected_completion
            .with_timezone(&self.offset)
            .date_naive();
        let candidate = sub_span(self.window_end_on(completion_day), task_duration);
        let floor = self.next_window_start(now).max(now);
        candidate.max(floor)
    }

    /// First allowed instant on a local day.
    pub fn window_start_on(&self, day: NaiveDate) -> DateTime<Utc> {
        self.local_to_utc(day.and_time(minute_to_time(self.earliest_minute)))
    }

    /// Last allowed instant on a local day; 23:59:59 for the midnight sentinel.
    pub fn window_end_on(&self, day: NaiveDate) -> DateTime<Utc> {
        let time = if self.is_open_ended() {
            NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
        } else {
            minute_to_time(self.latest_minute)
        };
        self.local_to_utc(day.and_time(time))
    }
}

fn minute_to_time(minute: u16) -> NaiveTime {
    let minute = u32::from(minute.min(MINUTES_PER_DAY - 1));
    NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).unwrap_or(NaiveTime::MIN)
}
