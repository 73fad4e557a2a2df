//! Pause and resume transitions over HTTP.

use axum::http::StatusCode;
use chrono::TimeDelta;

use crate::e2e_tests::helpers::TestApp;

#[tokio::test]
async fn test_pause_is_idempotent() {
    let app = TestApp::start().await;

    let (status, first) = app.post("/pause").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert_eq!(first["status"], "paused");
    assert_eq!(first["message"], "Generation paused");

    let (status, second) = app.post("/pause").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["success"], true);
    assert_eq!(second["message"], "Generation already paused");

    assert!(app.orchestrator.state().committed().lifecycle.paused);
    app.stop().await;
}

#[tokio::test]
async fn test_resume_while_running_is_noop() {
    let app = TestApp::start().await;

    let (status, body) = app.post("/resume").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "running");
    assert!(body.get("baseline").is_none());

    app.stop().await;
}

#[tokio::test]
async fn test_paused_generator_skips_intervals() {
    let app = TestApp::start().await;
    app.post("/pause").await;

    app.clock.advance(TimeDelta::seconds(30));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(app.orchestrator.state().committed().driver.total_batches, 1);

    let (_, body) = app.post("/resume").await;
    assert_eq!(body["baseline"]["performed"], false);
    // Let the loops observe the resume at 10:00:35.
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    // The next batch covers the interval in progress, not the ones missed.
    app.clock.advance(TimeDelta::seconds(10));
    app.wait_for(|state| state.driver.total_batches == 2).await;
    let state = app.orchestrator.state().committed();
    assert_eq!(
        state.driver.last_interval_end.map(crate::models::format_timestamp).as_deref(),
        Some("2025-11-09T10:00:40.000000Z")
    );

    app.stop().await;
}

#[tokio::test]
async fn test_control_rejected_during_shutdown() {
    let app = TestApp::start().await;
    app.orchestrator.shutdown();

    let (status, body) = app.post("/pause").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "shutting_down");

    let (status, _) = app.post("/resume").await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.stop().await;
}
