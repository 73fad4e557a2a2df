//! Baseline regeneration on resume after a clean.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use chrono::TimeDelta;

use crate::baseline::verify;
use crate::e2e_tests::helpers::TestApp;

#[tokio::test]
async fn test_clean_then_resume_regenerates_baseline() {
    let app = TestApp::start().await;
    app.post("/pause").await;
    app.post("/clean").await;
    assert!(!verify(app.layout()).is_complete());

    let started = Instant::now();
    let (status, body) = app.post("/resume").await;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "running");
    assert_eq!(body["baseline"]["performed"], true);
    assert_eq!(body["baseline"]["verification"]["missing"], serde_json::json!(["companies", "driver_events"]));
    assert_eq!(body["baseline"]["companies_created"], 5);
    assert_eq!(body["baseline"]["driver_batch"], "20251109T095950Z");
    assert_eq!(body["auto_reinit"]["performed"], true);
    assert_eq!(body["auto_reinit"]["count"], 1);

    let after = verify(app.layout());
    assert!(after.is_complete());
    assert!(after.companies_size > 0);
    assert_eq!(after.batch_count, 1);

    let (_, health) = app.get("/health").await;
    assert_eq!(health["auto_reinit"]["performed"], true);
    assert_eq!(health["lifecycle"]["degraded"], false);

    app.stop().await;
}

#[tokio::test]
async fn test_only_missing_events_are_regenerated() {
    let app = TestApp::start().await;
    app.post("/pause").await;

    let companies_before = std::fs::read_to_string(app.layout().companies_file()).unwrap();
    std::fs::remove_dir_all(app.layout().batch_dir("20251109T095950Z")).unwrap();

    let (_, body) = app.post("/resume").await;
    assert_eq!(body["baseline"]["performed"], true);
    assert_eq!(body["baseline"]["verification"]["missing"], serde_json::json!(["driver_events"]));
    assert_eq!(body["baseline"]["companies_created"], 0);

    let companies_after = std::fs::read_to_string(app.layout().companies_file()).unwrap();
    assert_eq!(companies_before, companies_after);
    assert!(verify(app.layout()).is_complete());

    app.stop().await;
}

#[tokio::test]
async fn test_repeated_resumes_do_not_regenerate() {
    let app = TestApp::start().await;
    let count_before = app.orchestrator.state().committed().auto_reinit.count;
    let companies_before = std::fs::read_to_string(app.layout().companies_file()).unwrap();

    for _ in 0..50 {
        let (status, _) = app.post("/pause").await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = app.post("/resume").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["baseline"]["performed"], false);
    }

    let state = app.orchestrator.state().committed();
    assert_eq!(state.auto_reinit.count, count_before);
    assert_eq!(state.company.total_batches, 1);
    assert_eq!(state.driver.total_batches, 1);
    let companies_after = std::fs::read_to_string(app.layout().companies_file()).unwrap();
    assert_eq!(companies_before, companies_after);

    app.stop().await;
}

#[tokio::test]
async fn test_failed_repair_degrades_until_next_successful_resume() {
    let app = TestApp::start().await;
    app.post("/pause").await;
    app.post("/clean").await;

    // With a regular file in place of raw/, no repair attempt can create the
    // directories it writes into, whatever the process permissions.
    let raw = app.layout().raw_dir();
    std::fs::remove_dir_all(&raw).unwrap();
    std::fs::write(&raw, "not a directory").unwrap();

    let (status, body) = app.post("/resume").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "baseline_degraded");
    assert_eq!(body["status"], "running");
    assert_eq!(body["baseline"]["attempts"], 3);
    assert_eq!(body["baseline"]["errors"].as_array().unwrap().len(), 3);

    let (_, health) = app.get("/health").await;
    assert_eq!(health["lifecycle"]["degraded"], true);

    let persisted: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(app.layout().state_file()).unwrap()).unwrap();
    assert_eq!(persisted["lifecycle"]["degraded"], true);

    std::fs::remove_file(&raw).unwrap();
    let (status, _) = app.post("/pause").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.post("/resume").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["baseline"]["performed"], true);
    assert!(verify(app.layout()).is_complete());

    let (_, health) = app.get("/health").await;
    assert_eq!(health["lifecycle"]["degraded"], false);
    assert!(!app.orchestrator.state().committed().lifecycle.degraded);

    // Let the loops observe the resume at 10:00:05, then close the interval.
    tokio::time::sleep(Duration::from_millis(30)).await;
    app.clock.advance(TimeDelta::seconds(5));
    app.wait_for(|state| state.driver.total_batches == 2).await;

    app.stop().await;
}
