//! Time source abstraction.
//!
//! Nothing in the generation path reads the wall clock directly. The
//! orchestrator, the baseline initializer and the health aggregator all take a
//! [`TimeSource`], so production uses [`SystemTimeSource`] while tests pin
//! "now" with [`ManualTimeSource`] and advance it explicitly.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};

/// Abstraction over the current instant.
pub trait TimeSource: Send + Sync {
    /// Current time in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Real time source using the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A time source that only moves when told to.
///
/// Safe to share between the worker tasks and the test driving them.
#[derive(Debug)]
pub struct ManualTimeSource {
    current: Mutex<DateTime<Utc>>,
}

impl ManualTimeSource {
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Move time forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current += delta;
    }

    /// Jump to an arbitrary instant (may move backwards).
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_system_time_source() {
        let source = SystemTimeSource;
        let t1 = source.now();
        let t2 = source.now();

        // After 2020-01-01
        assert!(t1.timestamp() > 1_577_836_800);
        assert!(t2 >= t1);
    }

    #[test]
    fn test_manual_time_advance_and_set() {
        let start = Utc.with_ymd_and_hms(2025, 11, 9, 12, 0, 0).unwrap();
        let time = ManualTimeSource::new(start);
        assert_eq!(time.now(), start);

        time.advance(TimeDelta::seconds(90));
        assert_eq!(time.now(), start + TimeDelta::seconds(90));

        time.set(start);
        assert_eq!(time.now(), start);
    }
}
