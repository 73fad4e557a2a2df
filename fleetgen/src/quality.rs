//! Deterministic data-quality injection.
//!
//! A record is corrupted with probability `error_rate` (one Bernoulli trial on
//! the batch RNG). A corrupted record receives exactly one issue, chosen by a
//! weighted draw over the per-type probabilities. A type whose weight is zero
//! is never chosen, so disabling a type suppresses it completely.
//!
//! The injector draws from the same stream as the record generator, which makes
//! the corruption pattern part of what a seed reproduces.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::QualityInjectionConfig;
use crate::models::format_timestamp;
use crate::rng::DeterministicRng;
use crate::schedule::Interval;

const MALFORMED_TIMESTAMPS: [&str; 6] = [
    "2024-13-01T00:00:00Z",
    "2024-01-32T00:00:00Z",
    "2024-01-01T25:00:00Z",
    "2024-01-01 00:00:00",
    "not-a-timestamp",
    "2024/01/01 00:00:00",
];

const INVALID_EVENT_TYPES: [&str; 5] = ["UNKNOWN_EVENT", "invalid-type", "123", "", "NaN"];
const INVALID_GEOGRAPHIES: [&str; 5] = ["XX", "usa", "UNKNOWN", "", "123"];

/// Largest displacement applied by a boundary violation.
const MAX_BOUNDARY_OFFSET_SECS: u64 = 3600;

/// Kind of corruption applied to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    MissingField,
    NullValue,
    MalformedTimestamp,
    InvalidEnum,
    Duplicate,
    BoundaryViolation,
}

impl IssueType {
    /// Every issue type, in the order used for the weighted draw.
    pub const ALL: [Self; 6] = [
        Self::MissingField,
        Self::NullValue,
        Self::MalformedTimestamp,
        Self::InvalidEnum,
        Self::Duplicate,
        Self::BoundaryViolation,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingField => "missing_field",
            Self::NullValue => "null_value",
            Self::MalformedTimestamp => "malformed_timestamp",
            Self::InvalidEnum => "invalid_enum",
            Self::Duplicate => "duplicate",
            Self::BoundaryViolation => "boundary_violation",
        }
    }

    /// Rejection code a downstream validator is expected to report.
    #[must_use]
    pub const fn reason_code(self) -> &'static str {
        match self {
            Self::MissingField => "FIELD_OMITTED",
            Self::NullValue => "NULL_INJECTION",
            Self::MalformedTimestamp => "TIMESTAMP_MALFORMED",
            Self::InvalidEnum => "ENUM_INVALID",
            Self::Duplicate => "DUPLICATE_ID",
            Self::BoundaryViolation => "BOUNDARY_VIOLATION",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which record schema is being corrupted; decides the affected fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Company,
    DriverEvent,
}

impl RecordKind {
    const fn id_field(self) -> &'static str {
        match self {
            Self::Company => "company_id",
            Self::DriverEvent => "event_id",
        }
    }

    const fn timestamp_field(self) -> &'static str {
        match self {
            Self::Company => "created_at",
            Self::DriverEvent => "timestamp",
        }
    }

    const fn enum_field(self) -> &'static str {
        match self {
            Self::Company => "geography",
            Self::DriverEvent => "event_type",
        }
    }

    const fn removable_fields(self) -> &'static [&'static str] {
        match self {
            Self::Company => &["geography", "active", "created_at"],
            Self::DriverEvent => &["event_type", "driver_id", "truck_id"],
        }
    }

    const fn nullable_fields(self) -> &'static [&'static str] {
        match self {
            Self::Company => &["company_id", "geography", "created_at"],
            Self::DriverEvent => &["event_type", "driver_id", "timestamp"],
        }
    }

    const fn invalid_enum_values(self) -> &'static [&'static str] {
        match self {
            Self::Company => &INVALID_GEOGRAPHIES,
            Self::DriverEvent => &INVALID_EVENT_TYPES,
        }
    }
}

/// One applied corruption, for logs and summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectedIssue {
    pub record_id: String,
    pub issue_type: IssueType,
    pub affected_field: String,
    pub original_value: Option<String>,
    pub injected_value: Option<String>,
}

/// Applies quality issues to records of one batch and remembers what it did.
#[derive(Debug)]
pub struct QualityInjector<'a> {
    config: &'a QualityInjectionConfig,
    issues: Vec<InjectedIssue>,
}

impl<'a> QualityInjector<'a> {
    #[must_use]
    pub const fn new(config: &'a QualityInjectionConfig) -> Self {
        Self {
            config,
            issues: Vec::new(),
        }
    }

    /// Whether records of `kind` are subject to injection at all.
    #[must_use]
    pub const fn applies_to(&self, kind: RecordKind) -> bool {
        self.config.enabled
            && match kind {
                RecordKind::Company => self.config.inject_in_companies,
                RecordKind::DriverEvent => self.config.inject_in_driver_events,
            }
    }

    const fn weights(&self) -> [f64; 6] {
        [
            self.config.missing_field_probability,
            self.config.null_value_probability,
            self.config.malformed_timestamp_probability,
            self.config.invalid_enum_probability,
            self.config.duplicate_probability,
            self.config.boundary_violation_probability,
        ]
    }

    /// Possibly corrupt `record` in place.
    ///
    /// Returns the applied issue type. For [`IssueType::Duplicate`] the record
    /// itself is left intact and the caller emits it twice. Out-of-scope records
    /// consume no draws.
    pub fn inject(
        &mut self,
        rng: &mut DeterministicRng,
        kind: RecordKind,
        record: &mut Map<String, Value>,
        window: Interval,
    ) -> Option<IssueType> {
        if !self.applies_to(kind) || !rng.chance(self.config.error_rate) {
            return None;
        }
        let issue_type = IssueType::ALL[rng.weighted_index(&self.weights())?];

        let record_id = format!(
            "{}_{}",
            match kind {
                RecordKind::Company => "company",
                RecordKind::DriverEvent => "driver_event",
            },
            record.get(kind.id_field()).and_then(Value::as_str).unwrap_or("unknown")
        );

        let (field, original, injected) = match issue_type {
            IssueType::MissingField => {
                let field = *rng.pick(kind.removable_fields())?;
                let original = record.remove(field)?;
                (field, Some(original), None)
            }
            IssueType::NullValue => {
                let field = *rng.pick(kind.nullable_fields())?;
                let original = record.insert(field.to_string(), Value::Null);
                (field, original, Some(Value::Null))
            }
            IssueType::MalformedTimestamp => {
                let field = kind.timestamp_field();
                let replacement = Value::from(*rng.pick(&MALFORMED_TIMESTAMPS)?);
                let original = record.insert(field.to_string(), replacement.clone());
                (field, original, Some(replacement))
            }
            IssueType::InvalidEnum => {
                let field = kind.enum_field();
                let replacement = Value::from(*rng.pick(kind.invalid_enum_values())?);
                let original = record.insert(field.to_string(), replacement.clone());
                (field, original, Some(replacement))
            }
            IssueType::Duplicate => {
                let field = kind.id_field();
                let id = record.get(field).cloned();
                (field, id.clone(), id)
            }
            IssueType::BoundaryViolation => {
                let field = kind.timestamp_field();
                let replacement = Value::from(format_timestamp(outside(rng, kind, window)));
                let original = record.insert(field.to_string(), replacement.clone());
                (field, original, Some(replacement))
            }
        };

        let issue = InjectedIssue {
            record_id,
            issue_type,
            affected_field: field.to_string(),
            original_value: original.as_ref().map(render),
            injected_value: injected.as_ref().map(render),
        };
        if self.config.log_injected_issues {
            warn!(
                target: "fleetgen::quality",
                record_id = %issue.record_id,
                issue_type = %issue.issue_type,
                reason_code = issue_type.reason_code(),
                affected_field = %issue.affected_field,
                original_value = ?issue.original_value,
                injected_value = ?issue.injected_value,
                "Quality issue injected"
            );
        }
        self.issues.push(issue);

        Some(issue_type)
    }

    #[must_use]
    pub fn issues(&self) -> &[InjectedIssue] {
        &self.issues
    }

    #[must_use]
    pub fn into_issues(self) -> Vec<InjectedIssue> {
        self.issues
    }
}

/// Issue counts keyed by type.
#[must_use]
pub fn summarize(issues: &[InjectedIssue]) -> BTreeMap<IssueType, usize> {
    let mut summary = BTreeMap::new();
    for issue in issues {
        *summary.entry(issue.issue_type).or_insert(0) += 1;
    }
    summary
}

/// A timestamp outside `window`. Companies are pushed past the end (a future
/// onboarding); events land on either side.
fn outside(rng: &mut DeterministicRng, kind: RecordKind, window: Interval) -> DateTime<Utc> {
    let offset = TimeDelta::seconds(i64::try_from(rng.below(MAX_BOUNDARY_OFFSET_SECS)).unwrap_or(0));
    let after = match kind {
        RecordKind::Company => true,
        RecordKind::DriverEvent => rng.chance(0.5),
    };
    if after {
        window.end + offset
    } else {
        window.start - offset - TimeDelta::seconds(1)
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
