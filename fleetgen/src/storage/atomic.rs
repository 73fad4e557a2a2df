use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::StorageError;

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path.file_name().map_or_else(|| "file".into(), |name| name.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write `value` as pretty JSON to `path` via temp file + fsync + rename.
///
/// # Errors
///
/// Returns an error if serialization or any filesystem step fails; the
/// previous content of `path` is left untouched in that case.
pub fn write_json_atomic<T: Serialize>(path: &Path, what: &'static str, value: &T) -> Result<(), StorageError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Serialize { what, source })?;
    bytes.push(b'\n');

    let temp = temp_sibling(path);
    let result = write_and_swap(&temp, path, &bytes);
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// Write `text` to `path` via temp file + fsync + rename.
///
/// # Errors
///
/// Returns an error if any filesystem step fails.
pub fn write_text_atomic(path: &Path, text: &str) -> Result<(), StorageError> {
    let temp = temp_sibling(path);
    let result = write_and_swap(&temp, path, text.as_bytes());
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn write_and_swap(temp: &Path, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut file = File::create(temp).map_err(StorageError::write(temp))?;
    file.write_all(bytes).map_err(StorageError::write(temp))?;
    file.sync_all().map_err(StorageError::write(temp))?;
    fs::rename(temp, path).map_err(StorageError::write(path))
}

/// Read a JSON document, returning `Ok(None)` when the file does not exist or
/// does not parse as `T`.
///
/// # Errors
///
/// Returns an error only when an existing file cannot be read.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StorageError::read(path)(err)),
    };
    Ok(serde_json::from_slice(&bytes).ok())
}
