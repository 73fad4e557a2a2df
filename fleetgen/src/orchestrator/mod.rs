//! Generation orchestrator.
//!
//! Owns the two generator loops and the control operations that act on them.
//! All shared pieces (config, lifecycle, state store, clock, artifact gate) are
//! held here and handed to each loop through a [`WorkerContext`].
//!
//! # Control operations
//!
//! - `pause`: flips the lifecycle and returns; an in-flight batch finishes.
//! - `resume`: runs the baseline check (still paused, under the exclusive
//!   gate), then flips to running. Concurrent resumes are serialized.
//! - `clean`: only while paused; deletes artifacts under the exclusive gate.
//! - `shutdown`: cooperative; loops exit at their next wake-up.

pub mod jobs;
mod worker;

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::baseline::{BaselineError, BaselineInitializer, BaselineReport, RetryPolicy};
use crate::config::GenerationConfig;
use crate::health::HealthAggregator;
use crate::lifecycle::{Lifecycle, LifecycleError, LifecycleStatus, Transition};
use crate::state::{GeneratorState, StateStore};
use crate::storage::{CleanReport, DataLayout, StorageError, resolve_seed, write_dataset_descriptor};
use crate::time::TimeSource;
pub use jobs::{BatchJob, CompanyJob, CompanyOutcome, DriverJob, DriverOutcome};
pub use worker::WorkerContext;

const PRODUCTION_POLL_INTERVAL: Duration = Duration::from_secs(1);
const EMULATED_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Tunables that tests shorten.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    /// Upper bound on how long a loop sleeps before re-checking the clock.
    /// Defaults to 1s in production mode and 0.5s in emulated mode.
    pub poll_interval: Option<Duration>,
    pub retry: RetryPolicy,
}

/// Result of a resume request.
#[derive(Debug)]
pub struct ResumeOutcome {
    pub transition: Transition,
    /// Baseline check result; `None` when already running.
    pub baseline: Option<Result<BaselineReport, BaselineError>>,
}

pub struct Orchestrator {
    config: Arc<GenerationConfig>,
    layout: DataLayout,
    clock: Arc<dyn TimeSource>,
    lifecycle: Arc<Lifecycle>,
    state: Arc<StateStore>,
    gate: Arc<RwLock<()>>,
    control: Mutex<()>,
    company: Arc<CompanyJob>,
    driver: Arc<DriverJob>,
    baseline: BaselineInitializer,
    poll_interval: Duration,
    base_seed: u64,
    started_at: DateTime<Utc>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("layout", &self.layout)
            .field("status", &self.lifecycle.status())
            .field("base_seed", &self.base_seed)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Prepare the data directory, resolve the seed and recover persisted state.
    ///
    /// A paused flag persisted by a previous run is restored.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory, seed manifest or state file
    /// cannot be prepared.
    pub fn new(
        config: GenerationConfig,
        layout: DataLayout,
        clock: Arc<dyn TimeSource>,
        options: OrchestratorOptions,
    ) -> Result<Self, StorageError> {
        layout.ensure_directories()?;
        let started_at = clock.now();
        let base_seed = resolve_seed(&layout, config.seed, started_at)?;
        if let Err(err) = write_dataset_descriptor(&layout, &config, base_seed, started_at) {
            warn!(error = %err, "Failed to write dataset descriptor");
        }

        let state = Arc::new(StateStore::open(layout.state_file(), clock.clone())?);
        let recovered = state.current().lifecycle;
        let initial = if recovered.paused {
            info!("Recovered paused state from previous run");
            LifecycleStatus::Paused
        } else {
            LifecycleStatus::Running
        };
        let lifecycle = Arc::new(Lifecycle::new(initial));
        lifecycle.set_degraded(recovered.degraded);
        state.update(|state| state.lifecycle.shutdown_requested = false);

        let config = Arc::new(config);
        let company = Arc::new(CompanyJob::new(config.clone(), layout.clone(), base_seed));
        let driver = Arc::new(DriverJob::new(config.clone(), layout.clone(), base_seed));
        let baseline = BaselineInitializer::new(
            layout.clone(),
            company.clone(),
            driver.clone(),
            state.clone(),
            lifecycle.clone(),
            clock.clone(),
            base_seed,
            options.retry,
        );
        let poll_interval = options.poll_interval.unwrap_or(if config.emulated_mode.enabled {
            EMULATED_POLL_INTERVAL
        } else {
            PRODUCTION_POLL_INTERVAL
        });

        info!(
            mode = %config.generation_mode(),
            seed = base_seed,
            company_interval = %config.active_company_interval(),
            driver_interval = %config.active_driver_interval(),
            "Orchestrator initialized"
        );

        Ok(Self {
            config,
            layout,
            clock,
            lifecycle,
            state,
            gate: Arc::new(RwLock::new(())),
            control: Mutex::new(()),
            company,
            driver,
            baseline,
            poll_interval,
            base_seed,
            started_at,
            workers: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Run the initial baseline check (when running) and spawn both loops.
    pub async fn start(&self) {
        if self.lifecycle.status() == LifecycleStatus::Running {
            info!("Initial startup, checking baseline");
            let _gate = self.gate.write().await;
            if let Err(err) = self.baseline.ensure().await {
                error!(error = %err, "Initial baseline failed, continuing in degraded mode");
            }
        }

        let company = tokio::spawn(worker::run_worker(self.company.clone(), self.worker_context()));
        let driver = tokio::spawn(worker::run_worker(self.driver.clone(), self.worker_context()));
        self.workers.lock().unwrap_or_else(PoisonError::into_inner).extend([company, driver]);
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            lifecycle: self.lifecycle.clone(),
            state: self.state.clone(),
            clock: self.clock.clone(),
            gate: self.gate.clone(),
            poll_interval: self.poll_interval,
        }
    }

    /// Request a pause. Returns without waiting for an in-flight batch.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ShuttingDown`] during shutdown.
    pub fn pause(&self) -> Result<Transition, LifecycleError> {
        let transition = self.lifecycle.pause()?;
        if transition == Transition::Changed {
            let now = self.clock.now();
            self.state.update(|state| {
                state.lifecycle.paused = true;
                state.lifecycle.paused_at = Some(now);
            });
            info!("Generation paused");
        }
        Ok(transition)
    }

    /// Resume generation, repairing the baseline first if it is missing.
    ///
    /// Resuming while running is a no-op without a baseline check.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ShuttingDown`] during shutdown.
    pub async fn resume(&self) -> Result<ResumeOutcome, LifecycleError> {
        let _control = self.control.lock().await;
        match self.lifecycle.status() {
            LifecycleStatus::Running => {
                return Ok(ResumeOutcome {
                    transition: Transition::Unchanged,
                    baseline: None,
                });
            }
            LifecycleStatus::ShuttingDown | LifecycleStatus::Terminated => return Err(LifecycleError::ShuttingDown),
            LifecycleStatus::Paused => {}
        }

        let baseline = {
            let _gate = self.gate.write().await;
            self.baseline.ensure().await
        };
        if let Err(err) = &baseline {
            error!(error = %err, "Baseline repair failed during resume");
        }

        let transition = self.lifecycle.resume()?;
        let now = self.clock.now();
        self.state.update(|state| {
            state.lifecycle.paused = false;
            state.lifecycle.resumed_at = Some(now);
        });
        info!(degraded = self.lifecycle.is_degraded(), "Generation resumed");

        Ok(ResumeOutcome {
            transition,
            baseline: Some(baseline),
        })
    }

    /// Delete every generated artifact. Only valid while paused.
    ///
    /// Counters are reset in memory; the state file stays deleted until the
    /// next state change.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotPaused`] while running and
    /// [`LifecycleError::ShuttingDown`] during shutdown.
    pub async fn clean(&self) -> Result<CleanReport, LifecycleError> {
        let _control = self.control.lock().await;
        match self.lifecycle.status() {
            LifecycleStatus::Paused => {}
            LifecycleStatus::Running => return Err(LifecycleError::NotPaused { action: "clean" }),
            LifecycleStatus::ShuttingDown | LifecycleStatus::Terminated => return Err(LifecycleError::ShuttingDown),
        }

        let _gate = self.gate.write().await;
        let report = self.layout.clean();
        let lifecycle = self.state.current().lifecycle;
        self.state.reset(GeneratorState {
            lifecycle,
            ..GeneratorState::default()
        });
        Ok(report)
    }

    /// Begin cooperative shutdown.
    pub fn shutdown(&self) {
        if self.lifecycle.shutdown() == Transition::Changed {
            self.state.update(|state| state.lifecycle.shutdown_requested = true);
            info!("Shutdown requested");
        }
    }

    /// Wait for both loops to exit, then mark the lifecycle terminated.
    pub async fn join(&self) {
        let handles = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                error!(error = %err, "Generator task failed");
            }
        }
        self.state.flush();
        self.lifecycle.mark_terminated();
        info!("Generator terminated");
    }

    /// Read-only health view over committed state.
    #[must_use]
    pub fn health(&self) -> HealthAggregator {
        HealthAggregator::new(
            self.state.subscribe(),
            self.lifecycle.clone(),
            self.clock.clone(),
            self.started_at,
            &self.config,
        )
    }

    #[must_use]
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    #[must_use]
    pub const fn layout(&self) -> &DataLayout {
        &self.layout
    }

    #[must_use]
    pub fn clock(&self) -> &dyn TimeSource {
        self.clock.as_ref()
    }

    #[must_use]
    pub const fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    #[must_use]
    pub const fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    #[must_use]
    pub const fn base_seed(&self) -> u64 {
        self.base_seed
    }
}
