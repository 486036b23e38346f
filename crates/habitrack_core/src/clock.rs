//! Wall-clock abstraction shared by services and the client session.
//!
//! # Responsibility
//! - Provide "now" for timestamps, calendar-date keys and timer deadlines.
//! - Allow tests to drive time deterministically.
//!
//! # Invariants
//! - Timestamps are Unix epoch milliseconds (UTC).
//! - Calendar dates are derived from UTC.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// Source of the current time.
pub trait Clock {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> i64;

    /// Current time as a UTC datetime.
    fn now(&self) -> DateTime<Utc> {
        datetime_from_ms(self.now_ms())
    }

    /// Calendar date used for per-day records (moods, reflections).
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: Rc<Cell<i64>>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Rc::new(Cell::new(start_ms)),
        }
    }

    /// Starts at the given UTC datetime.
    pub fn at(start: DateTime<Utc>) -> Self {
        Self::new(start.timestamp_millis())
    }

    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_ms.set(self.now_ms.get().saturating_add(delta));
    }

    pub fn set_ms(&self, now_ms: i64) {
        self.now_ms.set(now_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.get()
    }
}

/// Converts epoch milliseconds into a UTC datetime, clamping invalid input
/// to the Unix epoch.
pub fn datetime_from_ms(epoch_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(epoch_ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Calendar date (UTC) of an epoch-milliseconds timestamp.
pub fn date_of_ms(epoch_ms: i64) -> NaiveDate {
    datetime_from_ms(epoch_ms).date_naive()
}

/// Epoch milliseconds at UTC midnight of `date`.
pub fn start_of_day_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc().timestamp_millis())
        .unwrap_or(0)
}

pub(crate) fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
