//! Query service over the JSON-lines log file.
//!
//! The file is written by the `tracing-subscriber` JSON layer installed in
//! `main`. Each line is an object with `timestamp`, `level`, `target` and
//! `message`, plus the event's fields (flattened, or nested under `fields`).
//! Lines that do not parse are skipped.
//!
//! Entries are ordered by `(timestamp, line)`. The `nextSince` cursor carries
//! both parts (`2025-11-09T10:01:00.000000Z~42`) so a burst of lines sharing
//! one timestamp can be paged through without losing any. A bare RFC 3339
//! `since` keeps entries strictly newer than that instant.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::format_timestamp;
use crate::storage::StorageError;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

const CURSOR_SEPARATOR: char = '~';

/// Keys of a log line that are not part of the event context.
const RESERVED_KEYS: [&str; 9] = [
    "timestamp",
    "level",
    "target",
    "message",
    "fields",
    "span",
    "spans",
    "threadName",
    "threadId",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Parse a level name, case-insensitively. `warn` is accepted for `warning`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Raw query-string parameters of `GET /logs`.
///
/// Kept as strings so malformed values fall back to defaults instead of
/// rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogParams {
    pub limit: Option<String>,
    pub level: Option<String>,
    pub since: Option<String>,
}

/// Position after which a page starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCursor {
    pub timestamp: DateTime<Utc>,
    /// Line of the last entry already returned at `timestamp`; `None` skips
    /// every entry at that instant.
    pub line: Option<usize>,
}

impl LogCursor {
    /// Parse `{rfc3339}` or `{rfc3339}~{line}`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (ts, line) = match value.rsplit_once(CURSOR_SEPARATOR) {
            Some((ts, line)) => (ts, Some(line.parse::<usize>().ok()?)),
            None => (value, None),
        };
        let timestamp = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
        Some(Self { timestamp, line })
    }

    fn admits(&self, entry: &LogEntry) -> bool {
        match self.line {
            None => entry.timestamp > self.timestamp,
            Some(line) => (entry.timestamp, entry.line) > (self.timestamp, line),
        }
    }
}

/// Validated log query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    pub limit: usize,
    pub level: Option<LogLevel>,
    pub since: Option<LogCursor>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            level: None,
            since: None,
        }
    }
}

impl From<&LogParams> for LogQuery {
    fn from(params: &LogParams) -> Self {
        let limit = params
            .limit
            .as_deref()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .map_or(DEFAULT_LIMIT, |limit| {
                usize::try_from(limit).map_or(1, |limit| limit.clamp(1, MAX_LIMIT))
            });
        let level = params.level.as_deref().and_then(LogLevel::parse);
        let since = params.since.as_deref().and_then(LogCursor::parse);
        Self { limit, level, since }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub ts: String,
    pub level: LogLevel,
    pub message: String,
    pub source: String,
    pub context: Map<String, Value>,
    #[serde(skip)]
    timestamp: DateTime<Utc>,
    #[serde(skip)]
    line: usize,
}

impl LogEntry {
    fn cursor(&self) -> String {
        format!("{}{CURSOR_SEPARATOR}{}", self.ts, self.line)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub entries: Vec<LogEntry>,
    pub total_returned: usize,
    pub next_since: Option<String>,
}

/// Reads entries from one log file.
#[derive(Debug, Clone)]
pub struct LogReader {
    path: PathBuf,
}

impl LogReader {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Run `query` against the file. A missing file yields an empty page.
    ///
    /// With `since`, entries after the cursor are returned oldest first, up to
    /// `limit`. Without it, the newest `limit` entries are
    /// returned, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn query(&self, query: LogQuery) -> Result<LogPage, StorageError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(StorageError::read(&self.path)(err)),
        };

        let mut matching: Vec<LogEntry> = text
            .lines()
            .enumerate()
            .filter_map(|(line, text)| parse_line(line, text))
            .filter(|entry| query.level.is_none_or(|level| entry.level == level))
            .filter(|entry| query.since.is_none_or(|since| since.admits(entry)))
            .collect();
        matching.sort_by_key(|entry| (entry.timestamp, entry.line));

        let entries = if query.since.is_some() {
            matching.truncate(query.limit);
            matching
        } else {
            let skip = matching.len().saturating_sub(query.limit);
            matching.split_off(skip)
        };

        Ok(LogPage {
            total_returned: entries.len(),
            next_since: entries.last().map(LogEntry::cursor),
            entries,
        })
    }
}

fn parse_line(line: usize, text: &str) -> Option<LogEntry> {
    let Value::Object(mut object) = serde_json::from_str::<Value>(text.trim()).ok()? else {
        return None;
    };

    let timestamp = object
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())?
        .with_timezone(&Utc);
    let level = object.get("level").and_then(Value::as_str).and_then(LogLevel::parse)?;
    let source = object.get("target").and_then(Value::as_str).unwrap_or_default().to_string();

    let mut context = match object.remove("fields") {
        Some(Value::Object(fields)) => fields,
        _ => Map::new(),
    };
    let message = match context.remove("message").or_else(|| object.remove("message")) {
        Some(Value::String(message)) => message,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    for (key, value) in object {
        if !RESERVED_KEYS.contains(&key.as_str()) {
            context.insert(key, value);
        }
    }

    Some(LogEntry {
        ts: format_timestamp(timestamp),
        level,
        message,
        source,
        context,
        timestamp,
        line,
    })
}
