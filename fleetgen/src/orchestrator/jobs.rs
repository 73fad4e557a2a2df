//! One batch of work per generator kind.
//!
//! A job turns `(interval, batch_counter)` into files on disk. Jobs are
//! synchronous and self-contained: the scheduled loops and baseline repair both
//! drive them through [`execute`], which also folds the result into the
//! persisted counters.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::GenerationConfig;
use crate::generators::{CompanyGenerator, DriverEventGenerator, EventParams, eligible_company_ids};
use crate::models::BatchMetadata;
use crate::quality::summarize;
use crate::rng::batch_seed;
use crate::schedule::{Interval, IntervalScheduler};
use crate::state::{GeneratorState, StateStore};
use crate::storage::{DataLayout, StorageError, append_companies, load_companies, update_manifest, write_batch};

/// Generation work for one generator kind.
pub trait BatchJob: Send + Sync + 'static {
    type Outcome: Send;

    /// Name used in logs.
    const NAME: &'static str;

    fn scheduler(&self) -> IntervalScheduler;

    /// Counter that feeds the batch seed.
    fn batch_counter(state: &GeneratorState) -> u64;

    /// Generate and write the batch for `interval`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading inputs or writing the batch fails.
    fn run(&self, interval: Interval, batch_counter: u64, now: DateTime<Utc>) -> Result<Self::Outcome, StorageError>;

    /// Fold a completed batch into the persisted state.
    fn record(&self, state: &mut GeneratorState, outcome: &Self::Outcome, interval: Interval, now: DateTime<Utc>);
}

/// Run `job` for `interval` and persist the updated counters.
///
/// # Errors
///
/// Returns the job's error; state is left untouched in that case.
pub fn execute<J: BatchJob>(
    job: &J,
    state: &StateStore,
    interval: Interval,
    now: DateTime<Utc>,
) -> Result<J::Outcome, StorageError> {
    let counter = J::batch_counter(&state.current());
    let outcome = job.run(interval, counter, now)?;
    state.update(|state| job.record(state, &outcome, interval, now));
    Ok(outcome)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyOutcome {
    pub seed: u64,
    pub written: usize,
    pub rejected: usize,
    pub issues: usize,
}

/// Appends one onboarding batch to `companies.jsonl`.
#[derive(Debug)]
pub struct CompanyJob {
    config: Arc<GenerationConfig>,
    layout: DataLayout,
    base_seed: u64,
}

impl CompanyJob {
    #[must_use]
    pub const fn new(config: Arc<GenerationConfig>, layout: DataLayout, base_seed: u64) -> Self {
        Self {
            config,
            layout,
            base_seed,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }
}

impl BatchJob for CompanyJob {
    type Outcome = CompanyOutcome;

    const NAME: &'static str = "company";

    fn scheduler(&self) -> IntervalScheduler {
        IntervalScheduler::new(self.config.active_company_interval())
    }

    fn batch_counter(state: &GeneratorState) -> u64 {
        state.company.total_batches
    }

    fn run(&self, interval: Interval, batch_counter: u64, _now: DateTime<Utc>) -> Result<CompanyOutcome, StorageError> {
        let path = self.layout.companies_file();
        let snapshot = load_companies(&path)?;
        let seed = batch_seed(self.base_seed, batch_counter);

        let mut generator = CompanyGenerator::new(&self.config.quality_injection, snapshot.known_ids);
        let batch = generator.generate(self.config.active_company_count(), seed, interval);
        let written = append_companies(&path, &batch.records)?;

        if !batch.issues.is_empty() {
            info!(generator = Self::NAME, seed, summary = ?summarize(&batch.issues), "Quality injection summary");
        }
        info!(
            generator = Self::NAME,
            seed,
            written,
            rejected = batch.rejected.len(),
            interval_start = %interval.start,
            "Company batch written"
        );

        Ok(CompanyOutcome {
            seed,
            written,
            rejected: batch.rejected.len(),
            issues: batch.issues.len(),
        })
    }

    fn record(&self, state: &mut GeneratorState, outcome: &CompanyOutcome, interval: Interval, now: DateTime<Utc>) {
        state.company.record_batch(outcome.written as u64, interval.end, now);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOutcome {
    pub batch_id: String,
    pub seed: u64,
    pub eligible_companies: usize,
    pub event_count: u64,
    pub rejected: usize,
    pub issues: usize,
}

/// Writes one driver-event batch directory and updates the batch manifest.
#[derive(Debug)]
pub struct DriverJob {
    config: Arc<GenerationConfig>,
    layout: DataLayout,
    base_seed: u64,
}

impl DriverJob {
    #[must_use]
    pub const fn new(config: Arc<GenerationConfig>, layout: DataLayout, base_seed: u64) -> Self {
        Self {
            config,
            layout,
            base_seed,
        }
    }

    /// Volume parameters, rescaled in emulated mode so a batch lands near the
    /// middle of the configured event range.
    #[allow(clippy::cast_precision_loss)]
    fn params(&self, eligible: usize) -> EventParams {
        let config = &self.config;
        match config.active_event_bounds() {
            None => EventParams {
                drivers_per_company: config.drivers_per_company,
                event_rate_per_driver: config.event_rate_per_driver,
                max_events: None,
            },
            Some(bounds) => {
                let drivers = eligible as f64 * f64::from(config.drivers_per_company);
                let rate = if drivers > 0.0 {
                    (bounds.target() / drivers).max(0.1)
                } else {
                    config.event_rate_per_driver
                };
                EventParams {
                    drivers_per_company: config.drivers_per_company,
                    event_rate_per_driver: rate,
                    max_events: Some(bounds.max as usize),
                }
            }
        }
    }
}

impl BatchJob for DriverJob {
    type Outcome = DriverOutcome;

    const NAME: &'static str = "driver";

    fn scheduler(&self) -> IntervalScheduler {
        IntervalScheduler::new(self.config.active_driver_interval())
    }

    fn batch_counter(state: &GeneratorState) -> u64 {
        state.driver.total_batches
    }

    fn run(&self, interval: Interval, batch_counter: u64, now: DateTime<Utc>) -> Result<DriverOutcome, StorageError> {
        let snapshot = load_companies(&self.layout.companies_file())?;
        let mut eligible = eligible_company_ids(&snapshot.companies, interval.start);
        if self.config.emulated_mode.enabled {
            eligible.truncate(self.config.emulated_mode.companies_per_batch as usize);
        }

        let seed = batch_seed(self.base_seed, batch_counter);
        let generator = DriverEventGenerator::new(&self.config.quality_injection);
        let batch = generator.generate(&eligible, self.params(eligible.len()), interval, seed);

        let mode = self.config.emulated_mode.enabled.then(|| self.config.generation_mode());
        let metadata = write_batch(
            &self.layout,
            BatchMetadata::new(interval, 0, seed, now, mode),
            &batch.records,
        )?;
        if let Err(err) = update_manifest(&self.layout, &metadata, now) {
            tracing::warn!(batch_id = %metadata.batch_id, error = %err, "Failed to update batch manifest");
        }

        if !batch.issues.is_empty() {
            info!(generator = Self::NAME, batch_id = %metadata.batch_id, summary = ?summarize(&batch.issues), "Quality injection summary");
        }
        if !batch.rejected.is_empty() {
            info!(
                generator = Self::NAME,
                batch_id = %metadata.batch_id,
                truncated = batch.rejected.len(),
                "Batch truncated to emulated maximum"
            );
        }
        info!(
            generator = Self::NAME,
            batch_id = %metadata.batch_id,
            seed,
            eligible_companies = eligible.len(),
            event_count = metadata.event_count,
            "Driver batch written"
        );

        Ok(DriverOutcome {
            batch_id: metadata.batch_id,
            seed,
            eligible_companies: eligible.len(),
            event_count: metadata.event_count,
            rejected: batch.rejected.len(),
            issues: batch.issues.len(),
        })
    }

    fn record(&self, state: &mut GeneratorState, outcome: &DriverOutcome, interval: Interval, now: DateTime<Utc>) {
        state.driver.record_batch(outcome.event_count, interval.end, now);
    }
}
