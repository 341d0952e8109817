use httpmock::MockServer;
use serial_test::serial;

mod common;

use common::Bodies;
use timeapi_loadtest::metrics::{VUS, VUS_MAX};
use timeapi_loadtest::prelude::*;
use timeapi_loadtest::test_plan::StageAction;

#[tokio::test(flavor = "multi_thread")]
#[serial]
/// Users follow the ramp up and back down, and every stage is recorded.
async fn test_stages_ramp_users() {
    let server = MockServer::start_async().await;
    common::setup_mock_server_endpoints(&server, Bodies::default()).await;

    let configuration =
        common::build_configuration(&server, vec!["--stages", "3,1s;3,1s;0,1s"]);
    let metrics = common::run_load_test(configuration).await;

    let actions: Vec<StageAction> = metrics
        .history
        .iter()
        .map(|step| step.action.clone())
        .collect();
    assert_eq!(
        actions,
        vec![
            StageAction::Increasing,
            StageAction::Maintaining,
            StageAction::Decreasing,
            StageAction::Finished,
        ]
    );
    assert_eq!(metrics.gauge(VUS_MAX).unwrap().value, 3.0);
    let vus = metrics.gauge(VUS).unwrap();
    assert_eq!(vus.maximum, 3.0);
    assert!(metrics.duration >= 3.0);
}

#[tokio::test]
#[serial]
/// A load test without an iteration can't run.
async fn test_no_iteration() {
    let server = MockServer::start_async().await;
    let load_test =
        LoadTest::initialize_with_config(common::build_configuration(&server, vec![])).unwrap();
    match load_test.execute().await {
        Err(LoadTestError::NoIteration { .. }) => (),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
#[serial]
/// Invalid option combinations are rejected before anything runs.
async fn test_invalid_options() {
    let server = MockServer::start_async().await;
    for custom in [
        vec!["--verbose", "--quiet"],
        vec!["--report-file", "report.html", "--no-report-file"],
        vec!["--request-format", "csv"],
        vec!["--no-thresholds", "--threshold", "checks:rate>0.9"],
        vec!["--graceful-stop", "soon"],
        vec!["--stages", "10,"],
        vec!["--stages", "10,0s;0,0"],
    ] {
        let load_test = LoadTest::initialize_with_config(common::build_configuration(
            &server,
            custom.clone(),
        ))
        .unwrap();
        match scenario::time_api_load_test(load_test).unwrap().execute().await {
            Err(LoadTestError::InvalidOption { .. }) => (),
            other => panic!("{:?}: unexpected result {:?}", custom, other.map(|_| ())),
        }
    }
}

#[tokio::test]
#[serial]
/// Thresholds must name a declared metric, with an aggregation the metric supports.
async fn test_invalid_thresholds() {
    let server = MockServer::start_async().await;
    for threshold in ["GET_Missing:p(95)<100", "Rate_Status_OK:p(95)<100"] {
        let load_test = LoadTest::initialize_with_config(common::build_configuration(
            &server,
            vec!["--threshold", threshold],
        ))
        .unwrap();
        match scenario::time_api_load_test(load_test).unwrap().execute().await {
            Err(LoadTestError::InvalidThreshold { .. }) => (),
            other => panic!("{}: unexpected result {:?}", threshold, other.map(|_| ())),
        }
    }
}

#[tokio::test]
#[serial]
/// Listing the plan doesn't run the load test.
async fn test_list() {
    let server = MockServer::start_async().await;
    let mock_endpoints = common::setup_mock_server_endpoints(&server, Bodies::default()).await;

    let metrics = common::run_load_test(common::build_configuration(&server, vec!["--list"])).await;

    assert!(metrics.requests.is_empty());
    for mock in &mock_endpoints {
        assert_eq!(mock.hits_async().await, 0);
    }
}
