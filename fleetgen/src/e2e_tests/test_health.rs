//! Health and status snapshots.

use axum::http::StatusCode;
use chrono::TimeDelta;

use crate::e2e_tests::helpers::{CONFIG, TestApp};

#[tokio::test]
async fn test_health_after_initial_startup() {
    let app = TestApp::start().await;

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["generation_mode"], "production");
    assert_eq!(body["lifecycle"]["state"], "running");
    assert_eq!(body["lifecycle"]["paused"], false);
    assert_eq!(body["lifecycle"]["degraded"], false);
    // Initial startup regenerated the baseline.
    assert_eq!(body["company_generator"]["total_batches"], 1);
    assert_eq!(body["driver_generator"]["total_batches"], 1);
    assert_eq!(body["auto_reinit"]["performed"], true);
    assert_eq!(body["auto_reinit"]["count"], 1);
    assert_eq!(body["uptime"]["start_time"], "2025-11-09T10:00:05.000000Z");
    assert!(body.get("emulated_config").is_none());

    app.stop().await;
}

#[tokio::test]
async fn test_idle_seconds_and_status_alias() {
    let app = TestApp::start().await;
    app.orchestrator.pause().unwrap();
    app.clock.advance(TimeDelta::seconds(30));

    let (_, health) = app.get("/health").await;
    let (status, alias) = app.get("/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "paused");
    assert_eq!(health["uptime"]["seconds"], 30);
    assert_eq!(health["driver_generator"]["idle_seconds"], 30);
    assert_eq!(alias["status"], health["status"]);
    assert_eq!(alias["driver_generator"], health["driver_generator"]);

    app.stop().await;
}

#[tokio::test]
async fn test_emulated_parameters_exposed() {
    let config = format!(
        "{CONFIG}
emulated_mode:
  enabled: true
  company_batch_interval: PT5S
  driver_batch_interval: PT10S
  companies_per_batch: 3
  events_per_batch_min: 4
  events_per_batch_max: 8
"
    );
    let app = TestApp::start_with(&config).await;

    let (_, body) = app.get("/health").await;
    assert_eq!(body["generation_mode"], "emulated");
    assert_eq!(body["emulated_config"]["company_interval_seconds"], 5);
    assert_eq!(body["emulated_config"]["driver_interval_seconds"], 10);
    assert_eq!(body["emulated_config"]["companies_per_batch"], 3);
    assert_eq!(body["emulated_config"]["events_per_batch_range"], serde_json::json!([4, 8]));

    app.stop().await;
}
