use httpmock::MockServer;
use serial_test::serial;
use std::time::Duration;

mod common;

use common::Bodies;
use timeapi_loadtest::prelude::*;
use timeapi_loadtest::scenario::DURATION_METRIC;

#[tokio::test(flavor = "multi_thread")]
#[serial]
/// The default thresholds pass against a healthy API, and the reports are written.
async fn test_default_thresholds_pass() {
    let server = MockServer::start_async().await;
    common::setup_mock_server_endpoints(&server, Bodies::default()).await;

    let directory = common::temp_path("thresholds-pass");
    let report_file = directory.join("output").join("index.html");
    let summary_export = directory.join("summary.json");
    let report_file_arg = report_file.to_string_lossy().to_string();
    let summary_export_arg = summary_export.to_string_lossy().to_string();
    let configuration = common::build_configuration(
        &server,
        vec![
            "--report-file",
            &report_file_arg,
            "--summary-export",
            &summary_export_arg,
        ],
    );

    let metrics = common::run_load_test(configuration).await;

    let results: Vec<(String, ThresholdStatus)> = metrics
        .thresholds
        .iter()
        .map(|result| (format!("{}:{}", result.metric, result.expression), result.status))
        .collect();
    assert_eq!(
        results,
        vec![
            ("http_req_failed:rate<0.05".to_string(), ThresholdStatus::Passed),
            ("GET_Duration:p(95)<5700".to_string(), ThresholdStatus::Passed),
            ("Rate_Status_OK:rate>0.95".to_string(), ThresholdStatus::Passed),
        ]
    );
    assert!(metrics.thresholds_passed());

    // The report was written, creating the missing directory.
    let report = std::fs::read_to_string(&report_file).unwrap();
    assert!(report.contains("Thresholds passed"));
    assert!(report.contains("GET Time (Coordinates)"));
    assert!(report.contains(&server.base_url()));

    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary_export).unwrap()).unwrap();
    assert_eq!(exported["thresholds_passed"], true);
    assert_eq!(
        exported["metrics"]["Rate_Status_OK"]["thresholds"]["rate>0.95"]["ok"],
        true
    );

    std::fs::remove_dir_all(&directory).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
/// A slow endpoint breaches a tight duration threshold, failing the load test.
async fn test_slow_responses_fail_threshold() {
    let server = MockServer::start_async().await;
    let bodies = Bodies {
        system_delay: Duration::from_millis(100),
        ..Default::default()
    };
    common::setup_mock_server_endpoints(&server, bodies).await;

    let configuration = common::build_configuration(
        &server,
        vec!["--threshold", "GET_Duration:p(95)<50"],
    );
    let metrics = common::run_load_test(configuration).await;

    assert!(!metrics.thresholds_passed());
    let failed: Vec<&str> = metrics
        .thresholds
        .iter()
        .filter(|result| !result.passed())
        .map(|result| result.expression.as_str())
        .collect();
    assert_eq!(failed, vec!["p(95)<50"]);
    let observed = metrics
        .thresholds
        .iter()
        .find(|result| result.expression == "p(95)<50")
        .and_then(|result| result.observed)
        .unwrap();
    assert!(observed >= 100.0);
    assert!(metrics.trend(DURATION_METRIC).unwrap().max().unwrap() >= 100.0);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
/// An unreachable host fails every request with status 0, breaching the rate thresholds.
async fn test_unreachable_host_fails_thresholds() {
    let server = MockServer::start_async().await;
    // Nothing listens on port 1.
    let configuration = common::build_configuration(
        &server,
        vec!["--host", "http://127.0.0.1:1", "--stages", "1,1s"],
    );
    let metrics = common::run_load_test(configuration).await;

    assert!(!metrics.thresholds_passed());
    let statuses: Vec<(&str, ThresholdStatus)> = metrics
        .thresholds
        .iter()
        .map(|result| (result.metric.as_str(), result.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("http_req_failed", ThresholdStatus::Failed),
            ("GET_Duration", ThresholdStatus::Passed),
            ("Rate_Status_OK", ThresholdStatus::Failed),
        ]
    );
    assert!(metrics.requests["GET Invalid"].status_codes.contains_key(&0));
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
/// With thresholds disabled the load test always passes.
async fn test_no_thresholds() {
    let server = MockServer::start_async().await;
    let configuration = common::build_configuration(
        &server,
        vec!["--host", "http://127.0.0.1:1", "--stages", "1,1s", "--no-thresholds"],
    );
    let metrics = common::run_load_test(configuration).await;

    assert!(metrics.thresholds.is_empty());
    assert!(metrics.thresholds_passed());
}
