//! Boundary to the platform's local-notification scheduler.
//!
//! Delivery is fire-and-forget and happens out of process, possibly while
//! this process is suspended. The core tolerates missed or failed delivery:
//! timer state is authoritative and is reconciled independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use thiserror::Error;

/// Content of a reminder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
}

/// Failure reported by the notification scheduler.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NotificationError {
    #[error("Notification '{id}' rejected: {reason}")]
    Rejected { id: String, reason: String },

    #[error("Notification service unavailable: {0}")]
    Unavailable(String),
}

/// One-shot alert scheduling keyed by identifier.
pub trait NotificationPort {
    /// Request an alert at or after `fire_at`. Replaces any pending alert
    /// with the same id.
    fn schedule(
        &mut self,
        id: &str,
        fire_at: DateTime<Utc>,
        payload: &NotificationPayload,
    ) -> Result<(), NotificationError>;

    /// Remove a pending alert if present; no-op otherwise.
    fn cancel(&mut self, id: &str);
}

/// A scheduled alert as seen by [`InMemoryNotifier`].
#[derive(Clone, Debug, PartialEq)]
pub struct PendingNotification {
    pub fire_at: DateTime<Utc>,
    pub payload: NotificationPayload,
}

#[derive(Debug, Default)]
struct NotifierState {
    pending: BTreeMap<String, PendingNotification>,
    cancelled: Vec<String>,
    failure: Option<NotificationError>,
}

/// Notification port that records requests in memory.
///
/// Clones share state, so a test can keep a handle after moving one into a
/// session.
#[derive(Clone, Debug, Default)]
pub struct InMemoryNotifier {
    state: Rc<RefCell<NotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `schedule` call fail with `error`; `None` restores success.
    pub fn fail_with(&self, error: Option<NotificationError>) {
        self.state.borrow_mut().failure = error;
    }

    pub fn pending(&self, id: &str) -> Option<PendingNotification> {
        self.state.borrow().pending.get(id).cloned()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.state.borrow().pending.keys().cloned().collect()
    }

    /// Every id passed to `cancel`, in call order.
    pub fn cancelled(&self) -> Vec<String> {
        self.state.borrow().cancelled.clone()
    }
}

impl NotificationPort for InMemoryNotifier {
    fn schedule(
        &mut self,
        id: &str,
        fire_at: DateTime<Utc>,
        payload: &NotificationPayload,
    ) -> Result<(), NotificationError> {
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.failure.clone() {
            return Err(error);
        }
        state.pending.insert(
            id.to_string(),
            PendingNotification {
                fire_at,
                payload: payload.clone(),
            },
        );
        Ok(())
    }

    fn cancel(&mut self, id: &str) {
        let mut state = self.state.borrow_mut();
        state.pending.remove(id);
        state.cancelled.push(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn payload() -> NotificationPayload {
        NotificationPayload {
            title: "Bulk ferment".to_string(),
            body: "Time to shape".to_string(),
        }
    }

    #[test]
    fn schedule_replaces_same_id() {
        let mut notifier = InMemoryNotifier::new();
        let first = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap();

        notifier.schedule("bulk", first, &payload()).unwrap();
        notifier.schedule("bulk", second, &payload()).unwrap();

        assert_eq!(notifier.pending_ids(), vec!["bulk".to_string()]);
        assert_eq!(notifier.pending("bulk").unwrap().fire_at, second);
    }

    #[test]
    fn cancel_is_recorded_even_when_missing() {
        let mut notifier = InMemoryNotifier::new();
        notifier.cancel("ghost");
        notifier.cancel("ghost");
        assert_eq!(notifier.cancelled(), vec!["ghost".to_string(), "ghost".to_string()]);
    }

    #[test]
    fn injected_failure_is_returned() {
        let mut notifier = InMemoryNotifier::new();
        let shared = notifier.clone();
        shared.fail_with(Some(NotificationError::Unavailable("denied".to_string())));

        let result = notifier.schedule("bulk", Utc::now(), &payload());
        assert_eq!(
            result,
            Err(NotificationError::Unavailable("denied".to_string()))
        );
        assert!(shared.pending("bulk").is_none());
    }
}
