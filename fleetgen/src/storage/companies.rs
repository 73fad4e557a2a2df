use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde_json::Value;

use super::StorageError;
use crate::generators::OutputRecord;
use crate::models::Company;

/// What is currently in `companies.jsonl`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanySnapshot {
    /// Rows that parse as a complete, valid company.
    pub companies: Vec<Company>,
    /// Every string `company_id` present in the file, including corrupted rows.
    pub known_ids: HashSet<String>,
}

impl CompanySnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known_ids.is_empty() && self.companies.is_empty()
    }
}

/// Scan the companies file. A missing file is an empty snapshot.
///
/// # Errors
///
/// Returns an error if an existing file cannot be read.
pub fn load_companies(path: &Path) -> Result<CompanySnapshot, StorageError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(CompanySnapshot::default()),
        Err(err) => return Err(StorageError::read(path)(err)),
    };

    let mut snapshot = CompanySnapshot::default();
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        if let Some(id) = value.get("company_id").and_then(Value::as_str) {
            snapshot.known_ids.insert(id.to_string());
        }
        if let Ok(company) = serde_json::from_value::<Company>(value) {
            snapshot.companies.push(company);
        }
    }
    Ok(snapshot)
}

/// Append rows to the companies file and fsync. Returns the number written.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn append_companies(path: &Path, records: &[OutputRecord]) -> Result<usize, StorageError> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut buffer = String::new();
    for record in records {
        let line = record
            .to_json_line()
            .map_err(|source| StorageError::Serialize { what: "company", source })?;
        buffer.push_str(&line);
        buffer.push('\n');
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(StorageError::write(path))?;
    file.write_all(buffer.as_bytes()).map_err(StorageError::write(path))?;
    file.sync_all().map_err(StorageError::write(path))?;
    Ok(records.len())
}
