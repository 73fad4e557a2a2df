//! Read-only health snapshot.
//!
//! Reads the last committed [`GeneratorState`] through a watch receiver, so a
//! health request never waits on a batch or a state write in progress.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::config::{EmulatedSummary, GenerationConfig, GenerationMode};
use crate::lifecycle::{Lifecycle, LifecycleStatus};
use crate::models::format_timestamp;
use crate::state::{AutoReinitSummary, GeneratorCounters, GeneratorState};
use crate::time::TimeSource;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Uptime {
    pub seconds: i64,
    pub hours: f64,
    pub start_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratorHealth {
    pub total_batches: u64,
    pub total_records: u64,
    pub last_batch_time: Option<String>,
    /// Seconds since the last batch; `None` before the first one.
    pub idle_seconds: Option<i64>,
    pub last_interval_end: Option<String>,
}

impl GeneratorHealth {
    fn from_counters(counters: &GeneratorCounters, now: DateTime<Utc>) -> Self {
        Self {
            total_batches: counters.total_batches,
            total_records: counters.total_records,
            last_batch_time: counters.last_batch_time.map(format_timestamp),
            idle_seconds: counters.last_batch_time.map(|at| (now - at).num_seconds().max(0)),
            last_interval_end: counters.last_interval_end.map(format_timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleHealth {
    pub state: LifecycleStatus,
    pub paused: bool,
    pub shutdown_requested: bool,
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoReinitHealth {
    pub performed: bool,
    pub at: Option<String>,
    pub actions: Vec<String>,
    pub count: u64,
    pub missing: Vec<String>,
}

impl From<&AutoReinitSummary> for AutoReinitHealth {
    fn from(summary: &AutoReinitSummary) -> Self {
        Self {
            performed: summary.performed,
            at: summary.at.map(format_timestamp),
            actions: summary.actions.clone(),
            count: summary.count,
            missing: summary.missing.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateHealth {
    pub last_saved: Option<String>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    /// `paused` while paused, otherwise `running`.
    pub status: &'static str,
    pub timestamp: String,
    pub generation_mode: GenerationMode,
    pub uptime: Uptime,
    pub company_generator: GeneratorHealth,
    pub driver_generator: GeneratorHealth,
    pub lifecycle: LifecycleHealth,
    pub auto_reinit: AutoReinitHealth,
    pub state: StateHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emulated_config: Option<EmulatedSummary>,
}

/// Builds [`HealthSnapshot`]s without touching the generator loops.
#[derive(Clone)]
pub struct HealthAggregator {
    state: watch::Receiver<GeneratorState>,
    lifecycle: Arc<Lifecycle>,
    clock: Arc<dyn TimeSource>,
    started_at: DateTime<Utc>,
    mode: GenerationMode,
    emulated: Option<EmulatedSummary>,
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAggregator")
            .field("started_at", &self.started_at)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl HealthAggregator {
    #[must_use]
    pub fn new(
        state: watch::Receiver<GeneratorState>,
        lifecycle: Arc<Lifecycle>,
        clock: Arc<dyn TimeSource>,
        started_at: DateTime<Utc>,
        config: &GenerationConfig,
    ) -> Self {
        Self {
            state,
            lifecycle,
            clock,
            started_at,
            mode: config.generation_mode(),
            emulated: config.emulated_summary(),
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> HealthSnapshot {
        let now = self.clock.now();
        let state = self.state.borrow().clone();
        let status = self.lifecycle.status();
        let uptime_seconds = (now - self.started_at).num_seconds().max(0);

        HealthSnapshot {
            status: if status == LifecycleStatus::Paused { "paused" } else { "running" },
            timestamp: format_timestamp(now),
            generation_mode: self.mode,
            uptime: Uptime {
                seconds: uptime_seconds,
                hours: ((uptime_seconds as f64 / 3600.0) * 100.0).round() / 100.0,
                start_time: format_timestamp(self.started_at),
            },
            company_generator: GeneratorHealth::from_counters(&state.company, now),
            driver_generator: GeneratorHealth::from_counters(&state.driver, now),
            lifecycle: LifecycleHealth {
                state: status,
                paused: status == LifecycleStatus::Paused,
                shutdown_requested: matches!(status, LifecycleStatus::ShuttingDown | LifecycleStatus::Terminated),
                degraded: self.lifecycle.is_degraded(),
            },
            auto_reinit: AutoReinitHealth::from(&state.auto_reinit),
            state: StateHealth {
                last_saved: state.saved_at.map(format_timestamp),
            },
            emulated_config: self.emulated.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateStore;
    use crate::time::ManualTimeSource;
    use chrono::{TimeDelta, TimeZone};

    const PRODUCTION: &str = "
number_of_companies: 5
drivers_per_company: 2
event_rate_per_driver: 1.0
company_onboarding_interval: PT1H
";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 9, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualTimeSource::new(start()));
        let store = StateStore::open(dir.path().join("state.json"), clock.clone()).unwrap();
        let config = GenerationConfig::from_yaml_str(PRODUCTION).unwrap();
        let lifecycle = Arc::new(Lifecycle::new(LifecycleStatus::Running));
        let health = HealthAggregator::new(store.subscribe(), lifecycle, clock.clone(), start(), &config);

        clock.advance(TimeDelta::seconds(5400));
        let snapshot = health.snapshot();
        assert_eq!(snapshot.status, "running");
        assert_eq!(snapshot.generation_mode, GenerationMode::Production);
        assert_eq!(snapshot.uptime.seconds, 5400);
        assert!((snapshot.uptime.hours - 1.5).abs() < f64::EPSILON);
        assert_eq!(snapshot.uptime.start_time, "2025-11-09T10:00:00.000000Z");
        assert_eq!(snapshot.company_generator.total_batches, 0);
        assert_eq!(snapshot.company_generator.idle_seconds, None);
        assert_eq!(snapshot.emulated_config, None);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("emulated_config").is_none());
        assert_eq!(json["lifecycle"]["state"], "running");
        assert_eq!(json["generation_mode"], "production");
    }

    #[test]
    fn test_reads_committed_counters() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualTimeSource::new(start()));
        let store = StateStore::open(dir.path().join("state.json"), clock.clone()).unwrap();
        let config = GenerationConfig::from_yaml_str(PRODUCTION).unwrap();
        let lifecycle = Arc::new(Lifecycle::new(LifecycleStatus::Running));
        let health = HealthAggregator::new(store.subscribe(), lifecycle.clone(), clock.clone(), start(), &config);

        store.update(|state| state.driver.record_batch(12, start(), start()));
        clock.advance(TimeDelta::seconds(90));
        lifecycle.pause().unwrap();
        lifecycle.set_degraded(true);

        let snapshot = health.snapshot();
        assert_eq!(snapshot.status, "paused");
        assert_eq!(snapshot.driver_generator.total_batches, 1);
        assert_eq!(snapshot.driver_generator.total_records, 12);
        assert_eq!(snapshot.driver_generator.idle_seconds, Some(90));
        assert_eq!(
            snapshot.driver_generator.last_batch_time.as_deref(),
            Some("2025-11-09T10:00:00.000000Z")
        );
        assert!(snapshot.lifecycle.paused);
        assert!(snapshot.lifecycle.degraded);
        assert_eq!(snapshot.state.last_saved.as_deref(), Some("2025-11-09T10:00:00.000000Z"));
    }

    #[test]
    fn test_emulated_parameters_reported() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualTimeSource::new(start()));
        let store = StateStore::open(dir.path().join("state.json"), clock.clone()).unwrap();
        let config =
            GenerationConfig::from_yaml_str(&format!("{PRODUCTION}\nemulated_mode:\n  enabled: true\n")).unwrap();
        let lifecycle = Arc::new(Lifecycle::new(LifecycleStatus::ShuttingDown));
        let health = HealthAggregator::new(store.subscribe(), lifecycle, clock, start(), &config);

        let snapshot = health.snapshot();
        assert_eq!(snapshot.status, "running");
        assert!(snapshot.lifecycle.shutdown_requested);
        assert_eq!(snapshot.generation_mode, GenerationMode::Emulated);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["emulated_config"]["company_interval_seconds"], 10);
        assert_eq!(json["emulated_config"]["events_per_batch_range"], serde_json::json!([5, 20]));
    }
}
