//! Flat-file storage.
//!
//! Everything lives under one data directory (see [`DataLayout`]):
//! an append-only `companies.jsonl`, one directory per driver batch, and a few
//! JSON manifests, plus a human-readable `dataset.md`. Whole-file writes go
//! through [`write_json_atomic`] or [`write_text_atomic`] so a reader never
//! sees a half-written file.

mod atomic;
mod batches;
mod companies;
mod descriptor;
mod layout;
mod seed;

use std::path::{Path, PathBuf};

pub use atomic::{read_json, write_json_atomic, write_text_atomic};
pub use batches::{BatchInventory, batch_inventory, update_manifest, write_batch};
pub use companies::{CompanySnapshot, append_companies, load_companies};
pub use descriptor::write_dataset_descriptor;
pub use layout::{CleanReport, DataLayout};
pub use seed::{SeedManifest, resolve_seed, write_seed_manifest};

/// Error raised by file operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Writing, renaming or removing a path failed.
    #[error("write failure at {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Reading a path failed.
    #[error("read failure at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A record or manifest could not be serialized.
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// A complete batch for this interval is already on disk.
    #[error("batch {0} already exists")]
    BatchExists(String),
}

impl StorageError {
    pub(crate) fn write(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn read(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }
}
