//! Record generators.
//!
//! Both generators are pure functions of `(seed, inputs)`: they never read the
//! clock or the filesystem, so a batch is reproducible from its seed alone.

mod company;
mod driver_event;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};

pub use company::{CompanyBatch, CompanyGenerator};
pub use driver_event::{DriverEventGenerator, EventBatch, EventParams};

use crate::models::Company;
use crate::quality::IssueType;
use crate::rng::DeterministicRng;
use crate::schedule::Interval;

/// A generated record in the exact shape it will be written, possibly corrupted.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub fields: Map<String, Value>,
    pub issue: Option<IssueType>,
}

impl OutputRecord {
    /// Serialize as one JSON Lines row (without the trailing newline).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.fields)
    }

    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// A company whose id was already taken; the record is discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate company_id {company_id} discarded")]
pub struct DuplicateRecord {
    pub company_id: String,
}

/// Ids of companies onboarded strictly before `interval_start`.
///
/// This is the caller-side eligibility filter for driver batches; the driver
/// generator trusts its input.
#[must_use]
pub fn eligible_company_ids(companies: &[Company], interval_start: DateTime<Utc>) -> Vec<String> {
    companies
        .iter()
        .filter(|company| company.created_at < interval_start)
        .map(|company| company.company_id.clone())
        .collect()
}

/// Uniform instant in `[window.start, window.end)` at microsecond resolution.
fn instant_within(rng: &mut DeterministicRng, window: Interval) -> DateTime<Utc> {
    let span = window.duration().num_microseconds().and_then(|micros| u64::try_from(micros).ok()).unwrap_or(0);
    let offset = i64::try_from(rng.below(span)).unwrap_or(0);
    window.start + TimeDelta::microseconds(offset)
}
