//! Same seed, same clock, same bytes.

use chrono::TimeDelta;

use crate::e2e_tests::helpers::TestApp;

async fn run_two_intervals() -> (String, String, String) {
    let app = TestApp::start().await;
    // Let the loops pick up their first interval before the clock moves.
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    app.clock.advance(TimeDelta::seconds(5));
    app.wait_for(|state| state.company.total_batches == 2 && state.driver.total_batches == 2)
        .await;
    let layout = app.layout();
    let companies = std::fs::read_to_string(layout.companies_file()).unwrap();
    let first = std::fs::read_to_string(layout.batch_dir("20251109T095950Z").join("events.jsonl")).unwrap();
    let second = std::fs::read_to_string(layout.batch_dir("20251109T100000Z").join("events.jsonl")).unwrap();
    app.stop().await;
    (companies, first, second)
}

#[tokio::test]
async fn test_identical_runs_produce_identical_files() {
    let left = run_two_intervals().await;
    let right = run_two_intervals().await;

    assert_eq!(left.0.lines().count(), 10);
    assert!(!left.1.is_empty());
    assert_eq!(left, right);
}
