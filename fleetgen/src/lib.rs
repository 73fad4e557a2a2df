#![cfg_attr(test, allow(clippy::disallowed_methods, clippy::unwrap_used, clippy::expect_used))]
// Life of a batch:
// 1. A generator loop waits for the end of its current interval
//    (or wakes early on pause/shutdown)
// 2. The job reads its inputs (companies.jsonl for driver events)
// 3. Records are drawn from a ChaCha stream seeded by base_seed + batch counter
// 4. Quality issues are injected, then the batch is written atomically
// 5. Counters are folded into generator_state.json
//
// System components:
//  - Interval scheduler and lifecycle state machine
//  - Deterministic record generators and quality injector
//  - Flat-file storage and persisted state
//  - Baseline repair after a destructive reset
//  - HTTP control surface (health, pause, resume, clean, logs)

pub mod api;
pub mod baseline;
pub mod config;
pub mod generators;
pub mod health;
pub mod lifecycle;
pub mod logs;
pub mod models;
pub mod orchestrator;
pub mod quality;
pub mod rng;
pub mod schedule;
pub mod state;
pub mod storage;
pub mod time;

#[cfg(test)]
mod e2e_tests;

pub use api::{AppState, router};
pub use config::{GenerationConfig, ServiceConfig};
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use storage::DataLayout;
pub use time::{SystemTimeSource, TimeSource};
