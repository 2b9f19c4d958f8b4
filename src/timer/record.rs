//! Persisted timer record for one step.

use crate::core::{add_span, remaining_until, sub_span};
use crate::recipe::StepId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The persisted fact that a step's wait is running and when it ends.
///
/// `active` goes from `true` to `false` exactly once, by expiry
/// reconciliation. Cancellation removes the record instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTimerRecord {
    pub step_id: StepId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub end_time: DateTime<Utc>,
    pub duration_secs: i64,
    pub active: bool,
}

impl StepTimerRecord {
    /// Fresh active record ending at `started + duration`.
    pub fn started(step_id: StepId, duration: Duration, started: DateTime<Utc>) -> Self {
        Self {
            step_id,
            end_time: add_span(started, duration),
            duration_secs: duration.num_seconds(),
            active: true,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        sub_span(self.end_time, self.duration())
    }

    /// Running at `now`: flagged active and not yet past its end.
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.active && self.end_time > now
    }

    /// Past its end but not yet flipped by reconciliation.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.end_time <= now
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        remaining_until(self.end_time, now)
    }
}
