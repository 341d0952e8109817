use httpmock::MockServer;
use serial_test::serial;

mod common;

use common::Bodies;
use timeapi_loadtest::logger::RequestLogEntry;
use timeapi_loadtest::prelude::*;
use timeapi_loadtest::scenario::{INVALID_PATH, ZONE_PATH};

// Requests made by each iteration.
const REQUESTS_PER_ITERATION: usize = 4;

#[tokio::test(flavor = "multi_thread")]
#[serial]
/// Every request is written to the request log, one json object per line.
async fn test_request_log_json() {
    let server = MockServer::start_async().await;
    common::setup_mock_server_endpoints(&server, Bodies::default()).await;

    let request_log = common::temp_path("requests.json");
    let request_log_arg = request_log.to_string_lossy().to_string();
    let metrics = common::run_load_test(common::build_configuration(
        &server,
        vec!["--request-log", &request_log_arg],
    ))
    .await;

    let contents = std::fs::read_to_string(&request_log).unwrap();
    let entries: Vec<RequestLogEntry> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let requests: usize = metrics.requests.values().map(|r| r.requests).sum();
    assert_eq!(entries.len(), requests);
    assert!(entries.len() >= REQUESTS_PER_ITERATION);

    let zone = entries
        .iter()
        .find(|entry| entry.url.contains(ZONE_PATH))
        .unwrap();
    assert_eq!(zone.status, 200);
    assert!(zone.expected);
    let invalid = entries
        .iter()
        .find(|entry| entry.url.contains(INVALID_PATH))
        .unwrap();
    assert_eq!(invalid.status, 404);
    assert!(invalid.expected);

    std::fs::remove_file(&request_log).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
/// The csv request log starts with a header line.
async fn test_request_log_csv() {
    let server = MockServer::start_async().await;
    common::setup_mock_server_endpoints(&server, Bodies::default()).await;

    let request_log = common::temp_path("requests.csv");
    let request_log_arg = request_log.to_string_lossy().to_string();
    common::run_load_test(common::build_configuration(
        &server,
        vec!["--request-log", &request_log_arg, "--request-format", "csv"],
    ))
    .await;

    let contents = std::fs::read_to_string(&request_log).unwrap();
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some(RequestLogEntry::CSV_HEADER));
    let rows: Vec<&str> = lines.collect();
    assert!(rows.len() >= REQUESTS_PER_ITERATION);
    assert!(rows.iter().any(|row| row.contains(",404,true,")));

    std::fs::remove_file(&request_log).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
/// A request log that can't be created fails the load test before any user is launched.
async fn test_request_log_unwritable() {
    let server = MockServer::start_async().await;
    let mock_endpoints = common::setup_mock_server_endpoints(&server, Bodies::default()).await;

    let request_log = common::temp_path("missing-directory").join("requests.log");
    let request_log_arg = request_log.to_string_lossy().to_string();
    let load_test = LoadTest::initialize_with_config(common::build_configuration(
        &server,
        vec!["--request-log", &request_log_arg],
    ))
    .unwrap();
    match scenario::time_api_load_test(load_test).unwrap().execute().await {
        Err(LoadTestError::Io(_)) => (),
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }

    for mock in &mock_endpoints {
        assert_eq!(mock.hits_async().await, 0);
    }
}
