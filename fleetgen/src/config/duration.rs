//! ISO-8601 interval durations (`PT[nH][nM][nS]`).

use std::fmt;
use std::time::Duration;

use chrono::TimeDelta;
use serde::Deserialize;

/// Error returned when an interval string is not a supported ISO-8601 duration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ISO-8601 duration '{input}': {reason}")]
pub struct DurationParseError {
    pub input: String,
    pub reason: &'static str,
}

/// A whole-second duration written as `PT1H`, `PT15M`, `PT10S`, `PT1H30M`, ...
///
/// Only the time part of ISO-8601 is accepted; units must appear in H, M, S
/// order, each at most once, with integer amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct IsoDuration {
    seconds: u64,
}

impl IsoDuration {
    #[must_use]
    pub const fn from_secs(seconds: u64) -> Self {
        Self { seconds }
    }

    /// Parse a duration string.
    ///
    /// # Errors
    ///
    /// Returns an error for anything outside the `PT[nH][nM][nS]` subset, for a
    /// bare `PT`, and on overflow. A zero total parses; range checks belong to
    /// configuration validation.
    pub fn parse(input: &str) -> Result<Self, DurationParseError> {
        let fail = |reason| DurationParseError {
            input: input.to_string(),
            reason,
        };

        let body = input.trim().strip_prefix("PT").ok_or_else(|| fail("expected a 'PT' prefix"))?;
        if body.is_empty() {
            return Err(fail("no components after 'PT'"));
        }

        let mut seconds: u64 = 0;
        let mut digits = String::new();
        // Index of the last unit seen in "HMS"; enforces order and uniqueness.
        let mut last_unit: Option<usize> = None;

        for ch in body.chars() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                continue;
            }

            let (unit_index, multiplier) = match ch {
                'H' => (0, 3600),
                'M' => (1, 60),
                'S' => (2, 1),
                _ => return Err(fail("unsupported character")),
            };
            if digits.is_empty() {
                return Err(fail("unit without an amount"));
            }
            if last_unit.is_some_and(|last| last >= unit_index) {
                return Err(fail("units must appear once each in H, M, S order"));
            }
            last_unit = Some(unit_index);

            let amount: u64 = digits.parse().map_err(|_| fail("amount out of range"))?;
            digits.clear();
            seconds = amount
                .checked_mul(multiplier)
                .and_then(|part| seconds.checked_add(part))
                .ok_or_else(|| fail("duration out of range"))?;
        }

        if !digits.is_empty() {
            return Err(fail("trailing amount without a unit"));
        }

        Ok(Self { seconds })
    }

    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.seconds
    }

    #[must_use]
    pub const fn as_std(self) -> Duration {
        Duration::from_secs(self.seconds)
    }

    /// Duration as a chrono delta, saturating at the largest representable span.
    #[must_use]
    pub fn as_time_delta(self) -> TimeDelta {
        i64::try_from(self.seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

impl TryFrom<String> for IsoDuration {
    type Error = DurationParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.seconds / 3600;
        let minutes = (self.seconds % 3600) / 60;
        let seconds = self.seconds % 60;

        write!(f, "PT")?;
        if hours > 0 {
            write!(f, "{hours}H")?;
        }
        if minutes > 0 {
            write!(f, "{minutes}M")?;
        }
        if seconds > 0 || self.seconds == 0 {
            write!(f, "{seconds}S")?;
        }
        Ok(())
    }
}
