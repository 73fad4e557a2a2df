use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::StorageError;

/// Paths of every artifact under the data directory.
///
/// ```text
/// {root}/raw/companies.jsonl
/// {root}/raw/events/{batch_id}/{events.jsonl,batch_meta.json}
/// {root}/staged/
/// {root}/processed/
/// {root}/manifests/{generator_state,batch_manifest,seed_manifest}.json
/// {root}/manifests/dataset.md
/// {root}/manifests/logs/fleetgen.log.jsonl
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

/// Outcome of a destructive reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    /// Paths removed, relative to the data directory.
    pub deleted: Vec<String>,
    pub errors: Vec<String>,
}

impl CleanReport {
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }
}

impl DataLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    #[must_use]
    pub fn companies_file(&self) -> PathBuf {
        self.raw_dir().join("companies.jsonl")
    }

    #[must_use]
    pub fn events_dir(&self) -> PathBuf {
        self.raw_dir().join("events")
    }

    #[must_use]
    pub fn batch_dir(&self, batch_id: &str) -> PathBuf {
        self.events_dir().join(batch_id)
    }

    #[must_use]
    pub fn staged_dir(&self) -> PathBuf {
        self.root.join("staged")
    }

    #[must_use]
    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    #[must_use]
    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.manifests_dir().join("generator_state.json")
    }

    #[must_use]
    pub fn batch_manifest_file(&self) -> PathBuf {
        self.manifests_dir().join("batch_manifest.json")
    }

    #[must_use]
    pub fn seed_manifest_file(&self) -> PathBuf {
        self.manifests_dir().join("seed_manifest.json")
    }

    #[must_use]
    pub fn dataset_descriptor_file(&self) -> PathBuf {
        self.manifests_dir().join("dataset.md")
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.manifests_dir().join("logs")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("fleetgen.log.jsonl")
    }

    fn required_dirs(&self) -> [PathBuf; 6] {
        [
            self.raw_dir(),
            self.events_dir(),
            self.staged_dir(),
            self.processed_dir(),
            self.manifests_dir(),
            self.logs_dir(),
        ]
    }

    /// Create every directory the generators write into.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure_directories(&self) -> Result<(), StorageError> {
        for dir in self.required_dirs() {
            fs::create_dir_all(&dir).map_err(StorageError::write(&dir))?;
        }
        Ok(())
    }

    /// Delete every generated artifact and recreate the empty structure.
    ///
    /// Removes the companies file, each entry under the events root, the three
    /// manifests and the dataset descriptor. Logs are kept. Failures are collected rather than
    /// aborting, and a second call on a clean tree deletes nothing.
    pub fn clean(&self) -> CleanReport {
        let mut report = CleanReport::default();

        let mut targets = vec![self.companies_file()];
        match fs::read_dir(self.events_dir()) {
            Ok(entries) => {
                let mut batches: Vec<PathBuf> = entries.filter_map(Result::ok).map(|entry| entry.path()).collect();
                batches.sort();
                targets.extend(batches);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => report.errors.push(format!("{}: {err}", self.events_dir().display())),
        }
        targets.extend([
            self.state_file(),
            self.batch_manifest_file(),
            self.seed_manifest_file(),
            self.dataset_descriptor_file(),
        ]);

        for target in targets {
            let result = if target.is_dir() {
                fs::remove_dir_all(&target)
            } else {
                fs::remove_file(&target)
            };
            match result {
                Ok(()) => report.deleted.push(self.relative(&target)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %target.display(), error = %err, "Failed to delete artifact");
                    report.errors.push(format!("{}: {err}", self.relative(&target)));
                }
            }
        }

        if let Err(err) = self.ensure_directories() {
            report.errors.push(err.to_string());
        }

        info!(deleted = report.deleted.len(), errors = report.errors.len(), "Data directory cleaned");
        report
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root).unwrap_or(path).display().to_string()
    }
}
