//! Persisted generator state.
//!
//! [`StateStore`] owns the in-memory [`GeneratorState`] and its file
//! (`generator_state.json`). Every mutation is applied under the store's lock
//! and then persisted atomically; only a successful write is *committed* and
//! published to readers through a watch channel. Readers (health) never take
//! the writer's lock.
//!
//! A failed write leaves the store dirty; [`StateStore::flush`] retries it
//! without blocking generation.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::storage::{StorageError, read_json, write_json_atomic};
use crate::time::TimeSource;

/// Counters for one generator loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorCounters {
    /// Batches produced so far; also the batch counter fed into the seed.
    pub total_batches: u64,
    pub total_records: u64,
    pub last_batch_time: Option<DateTime<Utc>>,
    pub last_interval_end: Option<DateTime<Utc>>,
}

impl GeneratorCounters {
    pub fn record_batch(&mut self, records: u64, interval_end: DateTime<Utc>, at: DateTime<Utc>) {
        self.total_batches += 1;
        self.total_records += records;
        self.last_batch_time = Some(at);
        self.last_interval_end = Some(interval_end);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleFlags {
    pub paused: bool,
    pub shutdown_requested: bool,
    pub degraded: bool,
    pub paused_at: Option<DateTime<Utc>>,
    pub resumed_at: Option<DateTime<Utc>>,
}

/// What baseline repair has done.
///
/// `performed` is sticky: once a regeneration happened it stays true, and
/// `count` only moves when artifacts were actually regenerated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoReinitSummary {
    pub performed: bool,
    pub at: Option<DateTime<Utc>>,
    pub actions: Vec<String>,
    pub count: u64,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorState {
    pub saved_at: Option<DateTime<Utc>>,
    pub company: GeneratorCounters,
    pub driver: GeneratorCounters,
    pub lifecycle: LifecycleFlags,
    pub auto_reinit: AutoReinitSummary,
}

#[derive(Debug)]
struct Inner {
    state: GeneratorState,
    dirty: bool,
}

/// Single writer of `generator_state.json`.
pub struct StateStore {
    path: PathBuf,
    inner: Mutex<Inner>,
    committed: watch::Sender<GeneratorState>,
    clock: Arc<dyn TimeSource>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").field("path", &self.path).finish_non_exhaustive()
    }
}

impl StateStore {
    /// Load the state file at `path`, or start from defaults when it is missing
    /// or unreadable as state.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read.
    pub fn open(path: PathBuf, clock: Arc<dyn TimeSource>) -> Result<Self, StorageError> {
        let state = match read_json::<GeneratorState>(&path)? {
            Some(state) => state,
            None => {
                if path.exists() {
                    warn!(path = %path.display(), "State file unreadable, starting from defaults");
                }
                GeneratorState::default()
            }
        };
        let (committed, _) = watch::channel(state.clone());
        Ok(Self {
            path,
            inner: Mutex::new(Inner { state, dirty: false }),
            committed,
            clock,
        })
    }

    /// Apply `mutate` and persist. Returns whether the write committed.
    pub fn update(&self, mutate: impl FnOnce(&mut GeneratorState)) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        mutate(&mut inner.state);
        self.persist(&mut inner)
    }

    /// Retry a previously failed write. Returns whether the store is clean.
    pub fn flush(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.dirty {
            return true;
        }
        self.persist(&mut inner)
    }

    /// Replace the in-memory state without writing the file.
    ///
    /// Used after a destructive reset, whose point is that the state file is
    /// gone. The new state is published as committed.
    pub fn reset(&self, state: GeneratorState) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.state = state.clone();
        inner.dirty = false;
        self.committed.send_replace(state);
    }

    /// Current in-memory state (may be ahead of the committed snapshot).
    #[must_use]
    pub fn current(&self) -> GeneratorState {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).state.clone()
    }

    /// Last successfully persisted state.
    #[must_use]
    pub fn committed(&self) -> GeneratorState {
        self.committed.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<GeneratorState> {
        self.committed.subscribe()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).dirty
    }

    fn persist(&self, inner: &mut Inner) -> bool {
        inner.state.saved_at = Some(self.clock.now());
        match write_json_atomic(&self.path, "generator state", &inner.state) {
            Ok(()) => {
                inner.dirty = false;
                self.committed.send_replace(inner.state.clone());
                debug!(path = %self.path.display(), "State persisted");
                true
            }
            Err(err) => {
                inner.dirty = true;
                warn!(error = %err, "Failed to persist generator state, will retry");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualTimeSource;
    use chrono::{TimeDelta, TimeZone};

    fn clock() -> Arc<ManualTimeSource> {
        Arc::new(ManualTimeSource::new(Utc.with_ymd_and_hms(2025, 11, 9, 10, 0, 0).unwrap()))
    }

    #[test]
    fn test_open_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json"), clock()).unwrap();
        assert_eq!(store.current(), GeneratorState::default());
        assert_eq!(store.committed(), GeneratorState::default());
    }

    #[test]
    fn test_update_persists_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let clock = clock();
        let store = StateStore::open(path.clone(), clock.clone()).unwrap();
        let mut rx = store.subscribe();

        let at = clock.now();
        assert!(store.update(|state| state.company.record_batch(5, at, at)));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().company.total_batches, 1);

        let reopened = StateStore::open(path, clock.clone()).unwrap();
        let state = reopened.current();
        assert_eq!(state.company.total_batches, 1);
        assert_eq!(state.company.total_records, 5);
        assert_eq!(state.saved_at, Some(at));
    }

    #[test]
    fn test_failed_write_keeps_last_committed_and_retries() {
        let dir = tempfile::tempdir().unwrap();
        let missing_dir = dir.path().join("manifests");
        let clock = clock();
        let store = StateStore::open(missing_dir.join("state.json"), clock.clone()).unwrap();

        assert!(!store.update(|state| state.driver.total_batches = 3));
        assert!(store.is_dirty());
        assert_eq!(store.current().driver.total_batches, 3);
        assert_eq!(store.committed().driver.total_batches, 0);

        std::fs::create_dir_all(&missing_dir).unwrap();
        clock.advance(TimeDelta::seconds(1));
        assert!(store.flush());
        assert!(!store.is_dirty());
        assert_eq!(store.committed().driver.total_batches, 3);
    }

    #[test]
    fn test_reset_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::open(path.clone(), clock()).unwrap();
        store.update(|state| state.company.total_batches = 9);
        std::fs::remove_file(&path).unwrap();

        store.reset(GeneratorState::default());
        assert!(!path.exists());
        assert_eq!(store.committed().company.total_batches, 0);
        assert!(store.flush());
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        let store = StateStore::open(path, clock()).unwrap();
        assert_eq!(store.current(), GeneratorState::default());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"lifecycle": {"paused": true}}"#).unwrap();
        let store = StateStore::open(path, clock()).unwrap();
        let state = store.current();
        assert!(state.lifecycle.paused);
        assert_eq!(state.company, GeneratorCounters::default());
    }
}
