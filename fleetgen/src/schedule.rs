//! Epoch-aligned interval scheduling.
//!
//! Intervals are aligned to whole multiples of the duration counted from the
//! Unix epoch, never from process start, so a restart lands on the same cadence.
//! Loops wait on the absolute `end` of an interval rather than on accumulated
//! relative sleeps, which keeps the cadence drift-free.

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::IsoDuration;

const BATCH_ID_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// The interval immediately after this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            start: self.end,
            end: self.end + self.duration(),
        }
    }

    /// The interval immediately before this one.
    #[must_use]
    pub fn previous(&self) -> Self {
        Self {
            start: self.start - self.duration(),
            end: self.start,
        }
    }

    /// Directory name for a batch covering this interval.
    #[must_use]
    pub fn batch_id(&self) -> String {
        self.start.format(BATCH_ID_FORMAT).to_string()
    }
}

/// Computes aligned intervals for one fixed duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalScheduler {
    period_micros: i64,
}

impl IntervalScheduler {
    /// # Pre-conditions
    ///
    /// `duration` is at least one second (enforced by configuration validation).
    #[must_use]
    pub fn new(duration: IsoDuration) -> Self {
        let period_micros = i64::try_from(duration.as_secs())
            .ok()
            .and_then(|secs| secs.checked_mul(1_000_000))
            .unwrap_or(i64::MAX)
            .max(1);
        Self { period_micros }
    }

    #[must_use]
    pub const fn period(&self) -> TimeDelta {
        TimeDelta::microseconds(self.period_micros)
    }

    /// The aligned interval containing `instant`.
    ///
    /// An instant exactly on a boundary belongs to the interval it starts.
    #[must_use]
    pub fn interval_containing(&self, instant: DateTime<Utc>) -> Interval {
        let aligned = instant.timestamp_micros().div_euclid(self.period_micros) * self.period_micros;
        let start = DateTime::UNIX_EPOCH + TimeDelta::microseconds(aligned);
        Interval {
            start,
            end: start + self.period(),
        }
    }

    /// The next boundary strictly after `instant`.
    #[must_use]
    pub fn next_boundary(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.interval_containing(instant).end
    }

    /// The most recent interval that has fully closed at `instant`.
    #[must_use]
    pub fn last_completed(&self, instant: DateTime<Utc>) -> Interval {
        self.interval_containing(instant).previous()
    }
}
