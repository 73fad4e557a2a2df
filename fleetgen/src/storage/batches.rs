use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};

use super::{DataLayout, StorageError, read_json, write_json_atomic};
use crate::generators::OutputRecord;
use crate::models::{BatchManifest, BatchMetadata};

const EVENTS_FILE: &str = "events.jsonl";
const META_FILE: &str = "batch_meta.json";

/// Write a complete batch directory: `events.jsonl` plus `batch_meta.json`.
///
/// The directory is assembled under a hidden staging name and renamed into
/// place, so a batch is either fully present or absent. `metadata.event_count`
/// is overwritten with the number of records actually written.
///
/// # Errors
///
/// Returns [`StorageError::BatchExists`] if a complete batch for the same id
/// is already on disk, or a write error.
pub fn write_batch(
    layout: &DataLayout,
    mut metadata: BatchMetadata,
    records: &[OutputRecord],
) -> Result<BatchMetadata, StorageError> {
    let final_dir = layout.batch_dir(&metadata.batch_id);
    if final_dir.join(META_FILE).is_file() {
        return Err(StorageError::BatchExists(metadata.batch_id));
    }
    if final_dir.exists() {
        // Left over from an interrupted rename; not a valid batch.
        fs::remove_dir_all(&final_dir).map_err(StorageError::write(&final_dir))?;
    }

    let staging = layout.events_dir().join(format!(".{}.staging", metadata.batch_id));
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(StorageError::write(&staging))?;
    }
    fs::create_dir_all(&staging).map_err(StorageError::write(&staging))?;

    let mut buffer = String::new();
    for record in records {
        let line = record
            .to_json_line()
            .map_err(|source| StorageError::Serialize { what: "driver event", source })?;
        buffer.push_str(&line);
        buffer.push('\n');
    }
    metadata.event_count = records.len() as u64;

    let result = write_staged(&staging, buffer.as_bytes(), &metadata)
        .and_then(|()| fs::rename(&staging, &final_dir).map_err(StorageError::write(&final_dir)));
    if result.is_err() {
        let _ = fs::remove_dir_all(&staging);
    }
    result.map(|()| metadata)
}

fn write_staged(staging: &Path, events: &[u8], metadata: &BatchMetadata) -> Result<(), StorageError> {
    let events_path = staging.join(EVENTS_FILE);
    let mut file = File::create(&events_path).map_err(StorageError::write(&events_path))?;
    file.write_all(events).map_err(StorageError::write(&events_path))?;
    file.sync_all().map_err(StorageError::write(&events_path))?;
    write_json_atomic(&staging.join(META_FILE), "batch metadata", metadata)
}

/// Complete batches currently under the events root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchInventory {
    /// Batch ids, sorted (and therefore in interval order).
    pub batch_ids: Vec<String>,
}

impl BatchInventory {
    #[must_use]
    pub fn count(&self) -> usize {
        self.batch_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch_ids.is_empty()
    }
}

/// List every batch directory that holds a metadata sidecar.
///
/// # Errors
///
/// Returns an error if the events root exists but cannot be listed.
pub fn batch_inventory(layout: &DataLayout) -> Result<BatchInventory, StorageError> {
    let events_dir = layout.events_dir();
    let entries = match fs::read_dir(&events_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BatchInventory::default()),
        Err(err) => return Err(StorageError::read(&events_dir)(err)),
    };

    let mut batch_ids: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().join(META_FILE).is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| !name.starts_with('.'))
        .collect();
    batch_ids.sort();
    Ok(BatchInventory { batch_ids })
}

/// Fold a written batch into `batch_manifest.json`.
///
/// # Errors
///
/// Returns an error if the manifest cannot be read or written.
pub fn update_manifest(
    layout: &DataLayout,
    metadata: &BatchMetadata,
    now: DateTime<Utc>,
) -> Result<BatchManifest, StorageError> {
    let path = layout.batch_manifest_file();
    let mut manifest: BatchManifest = read_json(&path)?.unwrap_or_default();
    manifest.record(metadata, now);
    write_json_atomic(&path, "batch manifest", &manifest)?;
    Ok(manifest)
}
