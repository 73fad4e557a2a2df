//! Baseline detection and repair.
//!
//! The baseline is the minimum a downstream consumer needs: a non-empty
//! `companies.jsonl` and at least one complete driver batch. After a clean (or
//! on a fresh data directory) the initializer regenerates whichever piece is
//! missing, and only that piece.
//!
//! # Invariants
//!
//! - An existing companies file is never regenerated because events are missing
//! - `auto_reinit.count` moves only when something was regenerated
//! - Regenerated companies are onboarded before the regenerated driver
//!   interval starts, so the first batch has eligible companies

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::lifecycle::Lifecycle;
use crate::orchestrator::jobs::{BatchJob, CompanyJob, DriverJob, execute};
use crate::state::StateStore;
use crate::storage::{DataLayout, StorageError, batch_inventory, write_dataset_descriptor, write_seed_manifest};
use crate::time::TimeSource;

/// Target duration of a repair under default configuration.
const REPAIR_BUDGET: Duration = Duration::from_secs(5);

pub const MISSING_COMPANIES: &str = "companies";
pub const MISSING_DRIVER_EVENTS: &str = "driver_events";

/// Retry schedule for repair writes: `backoff_step * attempt` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

/// What the baseline check found on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BaselineVerification {
    pub companies_exists: bool,
    pub companies_size: u64,
    pub events_exists: bool,
    pub batch_count: usize,
    pub missing: Vec<String>,
}

impl BaselineVerification {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    fn companies_missing(&self) -> bool {
        self.missing.iter().any(|m| m == MISSING_COMPANIES)
    }

    fn events_missing(&self) -> bool {
        self.missing.iter().any(|m| m == MISSING_DRIVER_EVENTS)
    }
}

/// Inspect the data directory.
#[must_use]
pub fn verify(layout: &DataLayout) -> BaselineVerification {
    let companies_file = layout.companies_file();
    let companies_exists = companies_file.is_file();
    let companies_size = if companies_exists {
        std::fs::metadata(&companies_file).map_or(0, |meta| meta.len())
    } else {
        0
    };
    let batch_count = batch_inventory(layout).map_or(0, |inventory| inventory.count());

    let mut missing = Vec::new();
    if companies_size == 0 {
        missing.push(MISSING_COMPANIES.to_string());
    }
    if batch_count == 0 {
        missing.push(MISSING_DRIVER_EVENTS.to_string());
    }

    BaselineVerification {
        companies_exists,
        companies_size,
        events_exists: batch_count > 0,
        batch_count,
        missing,
    }
}

/// Summary of one baseline check, returned to `/resume`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BaselineReport {
    /// Whether anything was regenerated by this check.
    pub performed: bool,
    pub actions: Vec<String>,
    pub companies_created: usize,
    pub driver_batch: Option<String>,
    pub event_count: u64,
    pub attempts: u32,
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
    pub verification: BaselineVerification,
}

#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    /// Repair kept failing; the generator is now degraded.
    #[error("baseline repair of {piece} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        piece: &'static str,
        attempts: u32,
        #[source]
        source: StorageError,
        report: Box<BaselineReport>,
    },
}

impl BaselineError {
    #[must_use]
    pub fn report(&self) -> &BaselineReport {
        match self {
            Self::RetriesExhausted { report, .. } => report,
        }
    }
}

/// Detects missing baseline artifacts and regenerates them.
pub struct BaselineInitializer {
    layout: DataLayout,
    company: Arc<CompanyJob>,
    driver: Arc<DriverJob>,
    state: Arc<StateStore>,
    lifecycle: Arc<Lifecycle>,
    clock: Arc<dyn TimeSource>,
    base_seed: u64,
    policy: RetryPolicy,
}

impl std::fmt::Debug for BaselineInitializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaselineInitializer")
            .field("layout", &self.layout)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl BaselineInitializer {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        layout: DataLayout,
        company: Arc<CompanyJob>,
        driver: Arc<DriverJob>,
        state: Arc<StateStore>,
        lifecycle: Arc<Lifecycle>,
        clock: Arc<dyn TimeSource>,
        base_seed: u64,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            layout,
            company,
            driver,
            state,
            lifecycle,
            clock,
            base_seed,
            policy,
        }
    }

    /// Check the baseline and repair what is missing.
    ///
    /// The caller must hold the exclusive artifact gate.
    ///
    /// # Errors
    ///
    /// Returns [`BaselineError::RetriesExhausted`] when a piece could not be
    /// written within the retry policy. The generator is marked degraded.
    pub async fn ensure(&self) -> Result<BaselineReport, BaselineError> {
        let started = Instant::now();
        let verification = verify(&self.layout);

        if verification.is_complete() {
            debug!(batch_count = verification.batch_count, "Baseline present, nothing to regenerate");
            if self.lifecycle.is_degraded() {
                self.lifecycle.set_degraded(false);
                self.state.update(|state| state.lifecycle.degraded = false);
                info!("Baseline consistent again, leaving degraded mode");
            }
            return Ok(BaselineReport {
                verification,
                ..BaselineReport::default()
            });
        }

        warn!(missing = ?verification.missing, "Baseline incomplete, regenerating missing artifacts");
        let mut report = BaselineReport {
            performed: true,
            verification: verification.clone(),
            ..BaselineReport::default()
        };

        let now = self.clock.now();
        if !self.layout.seed_manifest_file().exists()
            && let Err(err) = write_seed_manifest(&self.layout, self.base_seed, now)
        {
            warn!(error = %err, "Failed to rewrite seed manifest");
        }
        if let Err(err) = write_dataset_descriptor(&self.layout, self.company.config(), self.base_seed, now) {
            warn!(error = %err, "Failed to rewrite dataset descriptor");
        }

        // The driver batch covers the last closed driver interval; companies
        // are onboarded in the company interval that ends before it starts.
        let driver_interval = self.driver.scheduler().last_completed(now);
        let company_interval = self.company.scheduler().interval_containing(driver_interval.start).previous();

        if verification.companies_missing() {
            let outcome = self
                .with_retry(MISSING_COMPANIES, &mut report, || {
                    self.layout.ensure_directories()?;
                    execute(self.company.as_ref(), &self.state, company_interval, now)
                })
                .await?;
            report.companies_created = outcome.written;
            report.actions.push(format!("regenerated {} companies", outcome.written));
        }

        if verification.events_missing() {
            let outcome = self
                .with_retry(MISSING_DRIVER_EVENTS, &mut report, || {
                    self.layout.ensure_directories()?;
                    execute(self.driver.as_ref(), &self.state, driver_interval, now)
                })
                .await?;
            report.actions.push(format!(
                "regenerated driver batch {} ({} events)",
                outcome.batch_id, outcome.event_count
            ));
            report.driver_batch = Some(outcome.batch_id);
            report.event_count = outcome.event_count;
        }

        let elapsed = started.elapsed();
        report.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if elapsed > REPAIR_BUDGET {
            warn!(elapsed_ms = report.elapsed_ms, "Baseline repair exceeded its time budget");
        }

        self.lifecycle.set_degraded(false);
        let actions = report.actions.clone();
        self.state.update(|state| {
            state.lifecycle.degraded = false;
            state.auto_reinit.performed = true;
            state.auto_reinit.at = Some(now);
            state.auto_reinit.actions = actions;
            state.auto_reinit.count += 1;
            state.auto_reinit.missing = verification.missing;
        });
        info!(actions = ?report.actions, elapsed_ms = report.elapsed_ms, "Baseline regenerated");

        Ok(report)
    }

    async fn with_retry<T>(
        &self,
        piece: &'static str,
        report: &mut BaselineReport,
        mut operation: impl FnMut() -> Result<T, StorageError> + Send,
    ) -> Result<T, BaselineError> {
        let mut attempt = 1;
        loop {
            report.attempts += 1;
            let err = match operation() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            warn!(piece, attempt, error = %err, "Baseline repair attempt failed");
            report.errors.push(format!("{piece} attempt {attempt}: {err}"));
            if attempt >= self.policy.max_attempts {
                return Err(self.degrade(piece, attempt, err, report));
            }
            tokio::time::sleep(self.policy.delay(attempt)).await;
            attempt += 1;
        }
    }

    fn degrade(&self, piece: &'static str, attempts: u32, source: StorageError, report: &BaselineReport) -> BaselineError {
        error!(piece, attempts, error = %source, "Baseline repair exhausted retries, entering degraded mode");
        self.lifecycle.set_degraded(true);
        let missing = report.verification.missing.clone();
        self.state.update(|state| {
            state.lifecycle.degraded = true;
            state.auto_reinit.missing = missing;
        });
        BaselineError::RetriesExhausted {
            piece,
            attempts,
            source,
            report: Box::new(report.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::lifecycle::LifecycleStatus;
    use crate::storage::load_companies;
    use crate::time::ManualTimeSource;
    use chrono::{TimeZone, Utc};

    const CONFIG: &str = "
seed: 42
number_of_companies: 5
drivers_per_company: 2
event_rate_per_driver: 2.0
company_onboarding_interval: PT1H
driver_event_interval: PT15M
";

    struct Harness {
        _dir: tempfile::TempDir,
        layout: DataLayout,
        state: Arc<StateStore>,
        lifecycle: Arc<Lifecycle>,
        baseline: BaselineInitializer,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        layout.ensure_directories().unwrap();
        let clock = Arc::new(ManualTimeSource::new(Utc.with_ymd_and_hms(2025, 11, 9, 10, 7, 0).unwrap()));
        let config = Arc::new(GenerationConfig::from_yaml_str(CONFIG).unwrap());
        let state = Arc::new(StateStore::open(layout.state_file(), clock.clone()).unwrap());
        let lifecycle = Arc::new(Lifecycle::new(LifecycleStatus::Paused));
        let baseline = BaselineInitializer::new(
            layout.clone(),
            Arc::new(CompanyJob::new(config.clone(), layout.clone(), 42)),
            Arc::new(DriverJob::new(config, layout.clone(), 42)),
            state.clone(),
            lifecycle.clone(),
            clock,
            42,
            RetryPolicy {
                max_attempts: 3,
                backoff_step: Duration::from_millis(1),
            },
        );
        Harness {
            _dir: dir,
            layout,
            state,
            lifecycle,
            baseline,
        }
    }

    #[tokio::test]
    async fn test_regenerates_everything_when_empty() {
        let h = harness();
        let report = h.baseline.ensure().await.unwrap();

        assert!(report.performed);
        assert_eq!(report.companies_created, 5);
        assert_eq!(report.driver_batch.as_deref(), Some("20251109T094500Z"));
        assert_eq!(report.verification.missing, vec![MISSING_COMPANIES, MISSING_DRIVER_EVENTS]);
        assert!(verify(&h.layout).is_complete());
        assert!(h.layout.seed_manifest_file().exists());

        // Companies were onboarded before the regenerated driver interval.
        let snapshot = load_companies(&h.layout.companies_file()).unwrap();
        let driver_start = Utc.with_ymd_and_hms(2025, 11, 9, 9, 45, 0).unwrap();
        assert!(snapshot.companies.iter().all(|c| c.created_at < driver_start));
        assert!(report.event_count > 0);

        let auto_reinit = h.state.committed().auto_reinit;
        assert!(auto_reinit.performed);
        assert_eq!(auto_reinit.count, 1);
        assert_eq!(auto_reinit.actions.len(), 2);
    }

    #[tokio::test]
    async fn test_existing_companies_are_kept() {
        let h = harness();
        h.baseline.ensure().await.unwrap();
        let companies_before = std::fs::read_to_string(h.layout.companies_file()).unwrap();
        for batch in batch_inventory(&h.layout).unwrap().batch_ids {
            std::fs::remove_dir_all(h.layout.batch_dir(&batch)).unwrap();
        }

        let report = h.baseline.ensure().await.unwrap();
        assert_eq!(report.verification.missing, vec![MISSING_DRIVER_EVENTS]);
        assert_eq!(report.companies_created, 0);
        assert_eq!(report.actions.len(), 1);
        assert_eq!(std::fs::read_to_string(h.layout.companies_file()).unwrap(), companies_before);
        assert_eq!(h.state.committed().auto_reinit.count, 2);
    }

    #[tokio::test]
    async fn test_repeated_checks_do_not_regenerate() {
        let h = harness();
        h.baseline.ensure().await.unwrap();
        for _ in 0..50 {
            let report = h.baseline.ensure().await.unwrap();
            assert!(!report.performed);
        }
        let state = h.state.committed();
        assert_eq!(state.auto_reinit.count, 1);
        assert!(state.auto_reinit.performed);
        assert_eq!(state.company.total_batches, 1);
        assert_eq!(state.driver.total_batches, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_mark_degraded() {
        let h = harness();
        // A directory where the companies file should be makes every append fail.
        std::fs::create_dir_all(h.layout.companies_file()).unwrap();

        let err = h.baseline.ensure().await.unwrap_err();
        let BaselineError::RetriesExhausted { piece, attempts, .. } = &err;
        assert_eq!(*piece, MISSING_COMPANIES);
        assert_eq!(*attempts, 3);
        assert_eq!(err.report().errors.len(), 3);
        assert!(h.lifecycle.is_degraded());
        assert!(h.state.committed().lifecycle.degraded);
        assert!(!h.state.committed().auto_reinit.performed);

        // Once the obstruction is gone a later check repairs and clears the flag.
        std::fs::remove_dir_all(h.layout.companies_file()).unwrap();
        let report = h.baseline.ensure().await.unwrap();
        assert!(report.performed);
        assert!(!h.lifecycle.is_degraded());
        assert!(!h.state.committed().lifecycle.degraded);
    }

    #[test]
    fn test_retry_delays_are_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(3));
    }

    #[test]
    fn test_verify_reports_sizes() {
        let h = harness();
        let empty = verify(&h.layout);
        assert!(!empty.companies_exists);
        assert_eq!(empty.batch_count, 0);

        std::fs::write(h.layout.companies_file(), "").unwrap();
        let zero_length = verify(&h.layout);
        assert!(zero_length.companies_exists);
        assert_eq!(zero_length.missing, vec![MISSING_COMPANIES, MISSING_DRIVER_EVENTS]);
    }
}
