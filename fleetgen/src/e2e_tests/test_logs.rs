//! Log queries over HTTP.

use axum::http::StatusCode;

use crate::e2e_tests::helpers::TestApp;

fn write_log(app: &TestApp, count: u32) {
    let mut text = String::new();
    for i in 0..count {
        let level = if i % 3 == 2 { "WARN" } else { "INFO" };
        text.push_str(&format!(
            r#"{{"timestamp":"2025-11-09T10:01:{i:02}.000000Z","level":"{level}","message":"entry {i}","target":"fleetgen::orchestrator::worker","generator":"driver"}}"#
        ));
        text.push('\n');
    }
    std::fs::write(app.layout().log_file(), text).unwrap();
}

fn messages(body: &serde_json::Value) -> Vec<String> {
    body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["message"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_logs_cursor_pagination() {
    let app = TestApp::start().await;
    write_log(&app, 6);

    let (status, first) = app.get("/logs?limit=4&since=2025-11-09T10:00:00Z").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages(&first), ["entry 0", "entry 1", "entry 2", "entry 3"]);
    assert_eq!(first["totalReturned"], 4);
    assert_eq!(first["nextSince"], "2025-11-09T10:01:03.000000Z~3");
    assert_eq!(first["entries"][0]["source"], "fleetgen::orchestrator::worker");
    assert_eq!(first["entries"][0]["context"]["generator"], "driver");

    let cursor = first["nextSince"].as_str().unwrap();
    let (_, second) = app.get(&format!("/logs?limit=4&since={cursor}")).await;
    assert_eq!(messages(&second), ["entry 4", "entry 5"]);

    let cursor = second["nextSince"].as_str().unwrap();
    let (_, done) = app.get(&format!("/logs?limit=4&since={cursor}")).await;
    assert_eq!(done["totalReturned"], 0);
    assert!(done["nextSince"].is_null());

    app.stop().await;
}

#[tokio::test]
async fn test_logs_level_and_limit() {
    let app = TestApp::start().await;
    write_log(&app, 9);

    let (_, body) = app.get("/logs?level=warning").await;
    assert_eq!(messages(&body), ["entry 2", "entry 5", "entry 8"]);
    assert_eq!(body["entries"][0]["level"], "warning");

    let (_, body) = app.get("/logs?limit=2").await;
    assert_eq!(messages(&body), ["entry 7", "entry 8"]);

    let (status, body) = app.get("/logs?limit=lots").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalReturned"], 9);

    app.stop().await;
}
