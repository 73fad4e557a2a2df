//! Common helpers for end-to-end tests.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt;

use crate::api::{AppState, router};
use crate::baseline::RetryPolicy;
use crate::config::GenerationConfig;
use crate::orchestrator::{Orchestrator, OrchestratorOptions};
use crate::storage::DataLayout;
use crate::time::ManualTimeSource;

pub const CONFIG: &str = "
seed: 42
number_of_companies: 5
drivers_per_company: 2
event_rate_per_driver: 2.0
company_onboarding_interval: PT10S
driver_event_interval: PT10S
";

/// Five seconds before a 10-second boundary.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 9, 10, 0, 5).unwrap()
}

/// A running orchestrator behind the HTTP router.
///
/// The temporary data directory is removed on drop.
pub struct TestApp {
    pub orchestrator: Arc<Orchestrator>,
    pub clock: Arc<ManualTimeSource>,
    app: Router,
    _dir: tempfile::TempDir,
}

impl TestApp {
    /// Start with the default test document.
    pub async fn start() -> Self {
        Self::start_with(CONFIG).await
    }

    pub async fn start_with(config: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualTimeSource::new(start_time()));
        let config = GenerationConfig::from_yaml_str(config).unwrap();
        let options = OrchestratorOptions {
            poll_interval: Some(Duration::from_millis(5)),
            retry: RetryPolicy {
                max_attempts: 3,
                backoff_step: Duration::from_millis(1),
            },
        };
        let orchestrator =
            Arc::new(Orchestrator::new(config, DataLayout::new(dir.path()), clock.clone(), options).unwrap());
        orchestrator.start().await;
        let app = router(AppState::new(orchestrator.clone()));
        Self {
            orchestrator,
            clock,
            app,
            _dir: dir,
        }
    }

    pub fn layout(&self) -> &DataLayout {
        self.orchestrator.layout()
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri).await
    }

    pub async fn post(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::POST, uri).await
    }

    async fn send(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    /// Poll until `condition` holds on the committed state, or panic.
    pub async fn wait_for(&self, condition: impl Fn(&crate::state::GeneratorState) -> bool) {
        for _ in 0..400 {
            if condition(&self.orchestrator.state().committed()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    pub async fn stop(self) {
        self.orchestrator.shutdown();
        tokio::time::timeout(Duration::from_secs(2), self.orchestrator.join()).await.unwrap();
    }
}
