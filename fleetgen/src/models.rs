//! Record schemas written to disk.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::config::GenerationMode;
use crate::schedule::Interval;

/// Render a timestamp the way every record and manifest stores it
/// (RFC 3339, microsecond precision, `Z` suffix).
#[must_use]
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn serialize_timestamp<S: Serializer>(instant: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(*instant))
}

/// Serialize a flat record into its JSON field map.
pub(crate) fn to_fields<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => fields,
        // Records only hold strings, bools and timestamps.
        _ => Map::new(),
    }
}

/// Operating geography of a company. Single-valued for now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Geography {
    #[serde(rename = "US")]
    Us,
}

impl Geography {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Us => "US",
        }
    }
}

/// A fleet company, written once to `companies.jsonl` and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub company_id: String,
    pub geography: Geography,
    pub active: bool,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Kind of driver activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "start driving")]
    StartDriving,
    #[serde(rename = "stopped driving")]
    StoppedDriving,
    #[serde(rename = "delivered")]
    Delivered,
}

impl EventType {
    pub const ALL: [Self; 3] = [Self::StartDriving, Self::StoppedDriving, Self::Delivered];

    /// Draw weights, index-aligned with [`EventType::ALL`].
    pub const WEIGHTS: [f64; 3] = [0.40, 0.35, 0.25];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StartDriving => "start driving",
            Self::StoppedDriving => "stopped driving",
            Self::Delivered => "delivered",
        }
    }
}

/// One driver event inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverEventRecord {
    pub event_id: String,
    pub driver_id: String,
    pub company_id: String,
    pub truck_id: String,
    pub event_type: EventType,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// The `batch_meta.json` sidecar of a driver batch.
///
/// `event_count` always equals the number of lines in the batch's `events.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub batch_id: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub interval_start: DateTime<Utc>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub interval_end: DateTime<Utc>,
    pub event_count: u64,
    pub seed: u64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub generation_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_mode: Option<GenerationMode>,
}

impl BatchMetadata {
    #[must_use]
    pub fn new(
        interval: Interval,
        event_count: u64,
        seed: u64,
        generation_time: DateTime<Utc>,
        generation_mode: Option<GenerationMode>,
    ) -> Self {
        Self {
            batch_id: interval.batch_id(),
            interval_start: interval.start,
            interval_end: interval.end,
            event_count,
            seed,
            generation_time,
            generation_mode,
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Interval {
        Interval {
            start: self.interval_start,
            end: self.interval_end,
        }
    }
}

/// Cumulative view over all driver batches (`batch_manifest.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchManifest {
    pub last_batch_id: Option<String>,
    pub total_batches: u64,
    pub total_events: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl BatchManifest {
    /// Fold one freshly written batch into the totals.
    pub fn record(&mut self, metadata: &BatchMetadata, now: DateTime<Utc>) {
        self.last_batch_id = Some(metadata.batch_id.clone());
        self.total_batches += 1;
        self.total_events += metadata.event_count;
        self.last_updated = Some(now);
    }
}
