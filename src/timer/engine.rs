//! Lifecycle of one timer per step.
//!
//! The engine is the only writer of timer records. Reads never mutate;
//! expiry is applied only by [`TimerEngine::reconcile`] and at load.

use super::record::StepTimerRecord;
use crate::checkpoint::{Checkpoint, Codec};
use crate::notify::{NotificationError, NotificationPayload, NotificationPort};
use crate::recipe::StepId;
use crate::store::{KeyValueStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Store key holding the timer map.
pub const TIMERS_KEY: &str = "timers";

type TimerMap = BTreeMap<StepId, StepTimerRecord>;

/// Outcome of [`TimerEngine::start`].
#[derive(Clone, Debug, PartialEq)]
pub struct TimerStart {
    pub record: StepTimerRecord,
    /// Set when the reminder could not be scheduled. The timer still runs.
    pub notification_error: Option<NotificationError>,
}

/// What [`TimerEngine::load`] found in the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadReport {
    /// Timers that ran out while the process was not running.
    pub finished_while_away: Vec<StepId>,
    /// The persisted map could not be decoded and was treated as empty.
    pub recovered_from_corruption: bool,
}

/// Manages durable step timers and their reminders.
pub struct TimerEngine<S: KeyValueStore, N: NotificationPort> {
    records: TimerMap,
    store: S,
    notifier: N,
    codec: Codec,
    unsaved: bool,
}

impl<S: KeyValueStore, N: NotificationPort> TimerEngine<S, N> {
    /// Engine with no timers. Nothing is read from `store`.
    pub fn new(store: S, notifier: N, codec: Codec) -> Self {
        Self {
            records: TimerMap::new(),
            store,
            notifier,
            codec,
            unsaved: false,
        }
    }

    /// Restore timers from `store`.
    ///
    /// Records that expired while the process was away are kept, flipped to
    /// inactive, and reported so the caller can show a completion notice.
    /// An unreadable map is treated as empty.
    pub fn load(store: S, notifier: N, codec: Codec, now: DateTime<Utc>) -> (Self, LoadReport) {
        let mut engine = Self::new(store, notifier, codec);
        let mut report = LoadReport::default();

        match engine.read_records() {
            Ok(records) => engine.records = records,
            Err(e) => {
                warn!("cannot load timer records, starting empty: {e}");
                report.recovered_from_corruption = true;
            }
        }

        report.finished_while_away = engine.flip_due(now);
        if !report.finished_while_away.is_empty() {
            info!(
                count = report.finished_while_away.len(),
                "timers finished while away"
            );
            engine.persist_or_defer();
        }

        (engine, report)
    }

    fn read_records(&self) -> Result<TimerMap, StoreError> {
        match self.store.read(TIMERS_KEY)? {
            Some(bytes) => Ok(self.codec.decode::<TimerMap>(&bytes)?.payload),
            None => Ok(TimerMap::new()),
        }
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let bytes = self
            .codec
            .encode(&Checkpoint::new(&self.records, Utc::now()))?;
        self.store.write(TIMERS_KEY, &bytes)?;
        self.unsaved = false;
        Ok(())
    }

    fn persist_or_defer(&mut self) {
        if let Err(e) = self.persist() {
            warn!("cannot persist timer records, will retry: {e}");
            self.unsaved = true;
        }
    }

    /// Start (or restart) the timer for `step_id`.
    ///
    /// The record is durably written before the reminder is requested. A
    /// storage failure aborts the start with no reminder scheduled; a
    /// reminder failure is reported but leaves the timer running.
    pub fn start(
        &mut self,
        step_id: &StepId,
        duration: Duration,
        payload: &NotificationPayload,
        now: DateTime<Utc>,
    ) -> Result<TimerStart, StoreError> {
        let record = StepTimerRecord::started(step_id.clone(), duration, now);
        let previous = self.records.insert(step_id.clone(), record.clone());

        if let Err(e) = self.persist() {
            match previous {
                Some(old) => self.records.insert(step_id.clone(), old),
                None => self.records.remove(step_id),
            };
            return Err(e);
        }

        info!(step = %step_id, end = %record.end_time, "timer started");

        let notification_error = self
            .notifier
            .schedule(step_id.as_str(), record.end_time, payload)
            .err();
        if let Some(e) = &notification_error {
            warn!(step = %step_id, "reminder not scheduled: {e}");
        }

        Ok(TimerStart {
            record,
            notification_error,
        })
    }

    /// Time left on an active timer, zero once past its end.
    ///
    /// `None` when there is no record or it has been reconciled inactive.
    pub fn remaining(&self, step_id: &StepId, now: DateTime<Utc>) -> Option<Duration> {
        self.records
            .get(step_id)
            .filter(|r| r.active)
            .map(|r| r.remaining(now))
    }

    pub fn is_active(&self, step_id: &StepId, now: DateTime<Utc>) -> bool {
        self.records
            .get(step_id)
            .is_some_and(|r| r.is_running(now))
    }

    pub fn record(&self, step_id: &StepId) -> Option<&StepTimerRecord> {
        self.records.get(step_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &StepTimerRecord> {
        self.records.values()
    }

    /// Flip every active record whose end has passed to inactive.
    ///
    /// Returns the ids flipped by this call. Calling again with the same
    /// `now` flips nothing.
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> Vec<StepId> {
        let expired = self.flip_due(now);
        for id in &expired {
            info!(step = %id, "timer expired");
        }
        if !expired.is_empty() || self.unsaved {
            self.persist_or_defer();
        }
        expired
    }

    fn flip_due(&mut self, now: DateTime<Utc>) -> Vec<StepId> {
        self.records
            .values_mut()
            .filter(|r| r.is_due(now))
            .map(|r| {
                r.active = false;
                r.step_id.clone()
            })
            .collect()
    }

    /// Remove the timer for `step_id` and its reminder.
    ///
    /// The reminder is always cancelled, even with no local record, so a
    /// pending alert from an earlier run cannot fire. If the removal cannot
    /// be saved it is written again by the next [`Self::reconcile`].
    pub fn cancel(&mut self, step_id: &StepId) -> Result<(), StoreError> {
        self.notifier.cancel(step_id.as_str());
        if self.records.remove(step_id).is_some() {
            debug!(step = %step_id, "timer cancelled");
            if let Err(e) = self.persist() {
                self.unsaved = true;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Remove every timer and its reminder.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        for id in self.records.keys() {
            self.notifier.cancel(id.as_str());
        }
        self.records.clear();
        if let Err(e) = self.store.remove(TIMERS_KEY) {
            self.unsaved = true;
            return Err(e);
        }
        self.unsaved = false;
        Ok(())
    }

    /// Running timers with their remaining time, in one pass.
    pub fn active_timers(&self, now: DateTime<Utc>) -> Vec<(StepId, Duration)> {
        self.records
            .values()
            .filter(|r| r.is_running(now))
            .map(|r| (r.step_id.clone(), r.remaining(now)))
            .collect()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }
}
