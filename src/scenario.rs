//! The time API load test.
//!
//! Every virtual user repeatedly looks up the current time four ways: by time zone, by
//! coordinate, from the system clock, and from an endpoint that does not exist. Each
//! lookup adds its duration to the `GET_Duration` trend, records whether the status was
//! the expected one in the `Rate_Status_OK` rate, and runs a couple of checks on the
//! response.

use async_trait::async_trait;
use serde_json::Value;

use crate::metrics::{Rate, Trend};
use crate::options::RunOptions;
use crate::test_plan::{Stage, TestPlan};
use crate::threshold::Threshold;
use crate::user::{Iteration, IterationResult, ParsedBody, RequestParams, RequestResult, VirtualUser};
use crate::{LoadTest, LoadTestError};

/// The public time API.
pub const DEFAULT_HOST: &str = "https://www.timeapi.io";
/// Where the html report is written unless configured otherwise.
pub const DEFAULT_REPORT_FILE: &str = "./src/output/index.html";

/// Trend of how long every lookup took, in milliseconds.
pub const DURATION_METRIC: &str = "GET_Duration";
/// Rate of lookups answered with the expected status.
pub const STATUS_OK_METRIC: &str = "Rate_Status_OK";

pub const ZONE_PATH: &str = "/api/Time/current/zone";
pub const COORDINATE_PATH: &str = "/api/Time/current/coordinate";
pub const SYSTEM_PATH: &str = "/api/Time/current/system";
pub const INVALID_PATH: &str = "/api/Time/invalid";

/// The zone requested by name, and expected back for the coordinate.
pub const TIME_ZONE: &str = "America/Sao_Paulo";
pub const LATITUDE: &str = "-23.55052";
pub const LONGITUDE: &str = "-46.633308";

const OK: u16 = 200;
const NOT_FOUND: u16 = 404;

/// The ramp, thresholds, host and report path of the time API load test.
pub fn run_options() -> Result<RunOptions, LoadTestError> {
    Ok(RunOptions {
        test_plan: TestPlan::new(vec![
            Stage::new(60, 10),
            Stage::new(60, 160),
            Stage::new(120, 300),
        ]),
        thresholds: vec![
            Threshold::new("http_req_failed", "rate<0.05")?,
            Threshold::new(DURATION_METRIC, "p(95)<5700")?,
            Threshold::new(STATUS_OK_METRIC, "rate>0.95")?,
        ],
        host: DEFAULT_HOST.to_string(),
        report_file: DEFAULT_REPORT_FILE.to_string(),
    })
}

/// Declare the custom metrics, options and iteration of the time API load test.
///
/// # Example
/// ```rust,no_run
/// use timeapi_loadtest::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), LoadTestError> {
///     let metrics = scenario::time_api_load_test(LoadTest::initialize()?)?
///         .execute()
///         .await?;
///     assert!(metrics.thresholds_passed());
///     Ok(())
/// }
/// ```
pub fn time_api_load_test(mut load_test: LoadTest) -> Result<LoadTest, LoadTestError> {
    let duration = load_test.declare_trend(DURATION_METRIC, true)?;
    let status_ok = load_test.declare_rate(STATUS_OK_METRIC)?;
    Ok(load_test
        .set_options(run_options()?)
        .register_iteration(TimeApiIteration::new(duration, status_ok)))
}

/// The four lookups made by every iteration.
#[derive(Debug, Clone)]
pub struct TimeApiIteration {
    duration: Trend,
    status_ok: Rate,
}

#[async_trait]
impl Iteration for TimeApiIteration {
    async fn run(&self, user: &mut VirtualUser) -> IterationResult {
        self.current_time_by_zone(user).await?;
        self.current_time_by_coordinate(user).await?;
        self.current_system_time(user).await?;
        self.invalid_endpoint(user).await?;
        Ok(())
    }
}

impl TimeApiIteration {
    pub fn new(duration: Trend, status_ok: Rate) -> Self {
        TimeApiIteration {
            duration,
            status_ok,
        }
    }

    // Every lookup feeds both custom metrics.
    fn record(&self, user: &VirtualUser, result: &RequestResult, expected_status: u16) {
        self.duration.add(user.metrics(), result.duration_ms);
        self.status_ok
            .add(user.metrics(), result.status == expected_status);
    }

    async fn current_time_by_zone(&self, user: &mut VirtualUser) -> IterationResult {
        let params = RequestParams::json()
            .with_query("timeZone", TIME_ZONE)
            .named("GET Time (Zone)");
        let result = user.get(ZONE_PATH, &params).await?;
        self.record(user, &result, OK);

        user.check("GET Time (Zone) - Status 200", result.status == OK);
        user.check(
            "GET Time (Zone) - Response contains time zone",
            zone_matches(&result.json(), TIME_ZONE),
        );
        Ok(())
    }

    async fn current_time_by_coordinate(&self, user: &mut VirtualUser) -> IterationResult {
        let params = RequestParams::json()
            .with_query("latitude", LATITUDE)
            .with_query("longitude", LONGITUDE)
            .named("GET Time (Coordinates)");
        let result = user.get(COORDINATE_PATH, &params).await?;
        self.record(user, &result, OK);

        user.check("GET Time (Coordinates) - Status 200", result.status == OK);
        user.check(
            "GET Time (Coordinates) - Response contains time zone",
            zone_matches(&result.json(), TIME_ZONE),
        );
        Ok(())
    }

    async fn current_system_time(&self, user: &mut VirtualUser) -> IterationResult {
        let params = RequestParams::json().named("GET Time (System)");
        let result = user.get(SYSTEM_PATH, &params).await?;
        self.record(user, &result, OK);

        user.check("GET Time (System) - Status 200", result.status == OK);
        user.check(
            "GET Time (System) - Response contains local time",
            result.json().field("currentLocalTime").is_some(),
        );
        Ok(())
    }

    async fn invalid_endpoint(&self, user: &mut VirtualUser) -> IterationResult {
        let params = RequestParams::json()
            .named("GET Invalid")
            .expect_status(NOT_FOUND);
        let result = user.get(INVALID_PATH, &params).await?;
        self.record(user, &result, NOT_FOUND);

        user.check("GET Invalid - Status 404", result.status == NOT_FOUND);
        match result.json() {
            body @ ParsedBody::Json(_) => {
                user.check(
                    "GET Invalid - Response contains error message",
                    body.field("message").is_some(),
                );
            }
            ParsedBody::Empty => error!("GET Invalid - response body is empty"),
            ParsedBody::Invalid(e) => {
                error!("GET Invalid - failed to parse JSON: {}", e);
                error!("GET Invalid - response body: {}", result.body);
            }
        }
        Ok(())
    }
}

/// Whether the body reports the expected time zone. Anything but JSON does not.
pub fn zone_matches(body: &ParsedBody, time_zone: &str) -> bool {
    matches!(body.field("timeZone"), Some(Value::String(zone)) if zone == time_zone)
}
