//! Destructive reset preconditions and idempotence.

use axum::http::StatusCode;

use crate::baseline::verify;
use crate::e2e_tests::helpers::TestApp;

#[tokio::test]
async fn test_clean_rejected_while_running() {
    let app = TestApp::start().await;

    let (status, body) = app.post("/clean").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "pause_required");
    assert_eq!(body["message"], "generator must be paused before clean");

    // Nothing was touched.
    assert!(verify(app.layout()).is_complete());
    assert_eq!(app.orchestrator.state().committed().company.total_batches, 1);

    app.stop().await;
}

#[tokio::test]
async fn test_clean_twice_deletes_nothing_the_second_time() {
    let app = TestApp::start().await;
    app.post("/pause").await;

    let (status, first) = app.post("/clean").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["success"], true);
    assert!(first["deleted_count"].as_u64().unwrap() >= 3);
    let deleted: Vec<&str> = first["deleted"].as_array().unwrap().iter().filter_map(|v| v.as_str()).collect();
    assert!(deleted.contains(&"raw/companies.jsonl"));
    assert!(deleted.contains(&"raw/events/20251109T095950Z"));

    let (status, second) = app.post("/clean").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["success"], true);
    assert_eq!(second["deleted_count"], 0);
    assert_eq!(second["errors"], serde_json::json!([]));

    assert!(app.layout().events_dir().is_dir());
    assert!(app.layout().staged_dir().is_dir());
    assert!(app.layout().processed_dir().is_dir());
    assert!(app.layout().manifests_dir().is_dir());

    let (_, health) = app.get("/health").await;
    assert_eq!(health["status"], "paused");
    assert_eq!(health["company_generator"]["total_batches"], 0);
    assert_eq!(health["auto_reinit"]["performed"], false);

    app.stop().await;
}

#[tokio::test]
async fn test_clean_reports_failure_when_structure_cannot_be_recreated() {
    let app = TestApp::start().await;
    app.post("/pause").await;

    // A regular file where a directory belongs cannot be turned back into one.
    let staged = app.layout().staged_dir();
    std::fs::remove_dir(&staged).unwrap();
    std::fs::write(&staged, "not a directory").unwrap();

    let (status, body) = app.post("/clean").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["action"], "clean");
    assert!(!body["errors"].as_array().unwrap().is_empty());
    // Artifacts that could be removed still were.
    let deleted: Vec<&str> = body["deleted"].as_array().unwrap().iter().filter_map(|v| v.as_str()).collect();
    assert!(deleted.contains(&"raw/companies.jsonl"));

    std::fs::remove_file(&staged).unwrap();
    let (status, body) = app.post("/clean").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(staged.is_dir());

    app.stop().await;
}
