use gumdrop::Options;
use httpmock::{Method::GET, Mock, MockServer};
use std::time::Duration;

use timeapi_loadtest::config::Configuration;
use timeapi_loadtest::prelude::*;
use timeapi_loadtest::scenario::{
    COORDINATE_PATH, INVALID_PATH, LATITUDE, LONGITUDE, SYSTEM_PATH, TIME_ZONE, ZONE_PATH,
};

/// A well formed response from the zone and coordinate lookups.
pub const ZONE_BODY: &str = r#"{"year":2024,"month":5,"day":14,"hour":10,"minute":30,"seconds":12,"dateTime":"2024-05-14T10:30:12.5","timeZone":"America/Sao_Paulo","dstActive":false}"#;
/// A well formed response from the system time lookup.
pub const SYSTEM_BODY: &str = r#"{"utcTime":"2024-05-14T13:30:12.5Z","currentLocalTime":"2024-05-14T10:30:12.5","timeZone":"UTC"}"#;
/// A well formed response from the invalid endpoint.
pub const INVALID_BODY: &str = r#"{"message":"Not Found"}"#;

/// The bodies served by the mocked time API.
#[derive(Clone, Copy, Debug)]
pub struct Bodies<'a> {
    pub zone: &'a str,
    pub coordinate: &'a str,
    pub system: &'a str,
    pub invalid: &'a str,
    /// The status returned by the zone lookup.
    pub zone_status: u16,
    /// How long the system time lookup takes to respond.
    pub system_delay: Duration,
}
impl Default for Bodies<'_> {
    fn default() -> Self {
        Bodies {
            zone: ZONE_BODY,
            coordinate: ZONE_BODY,
            system: SYSTEM_BODY,
            invalid: INVALID_BODY,
            zone_status: 200,
            system_delay: Duration::ZERO,
        }
    }
}

/// Not all functions are used by all tests, so we enable allow(dead_code) to avoid
/// compiler warnings during testing.
///
/// Mock the four time API endpoints, returning the mocks in request order.
#[allow(dead_code)]
pub async fn setup_mock_server_endpoints<'a>(
    server: &'a MockServer,
    bodies: Bodies<'_>,
) -> Vec<Mock<'a>> {
    vec![
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(ZONE_PATH)
                    .query_param("timeZone", TIME_ZONE);
                then.status(bodies.zone_status)
                    .header("Content-Type", "application/json")
                    .body(bodies.zone);
            })
            .await,
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(COORDINATE_PATH)
                    .query_param("latitude", LATITUDE)
                    .query_param("longitude", LONGITUDE);
                then.status(200)
                    .header("Content-Type", "application/json")
                    .body(bodies.coordinate);
            })
            .await,
        server
            .mock_async(|when, then| {
                when.method(GET).path(SYSTEM_PATH);
                then.status(200)
                    .header("Content-Type", "application/json")
                    .body(bodies.system)
                    .delay(bodies.system_delay);
            })
            .await,
        server
            .mock_async(|when, then| {
                when.method(GET).path(INVALID_PATH);
                then.status(404)
                    .header("Content-Type", "application/json")
                    .body(bodies.invalid);
            })
            .await,
    ]
}

/// The following options are configured by default, if not set to a custom value:
///  --host <mock-server>
///  --stages 2,1s
///  --graceful-stop 5s
///  --no-summary
///  --no-report-file (unless --report-file is set)
pub fn build_configuration(server: &MockServer, custom: Vec<&str>) -> Configuration {
    // Start with an empty configuration.
    let mut configuration: Vec<&str> = vec![];
    // Declare server_url here no matter what, so its lifetime is sufficient when needed.
    let server_url = server.base_url();

    // Merge in all custom options first.
    configuration.extend_from_slice(&custom);

    // Default to using mock server if not otherwise configured.
    if !configuration.contains(&"--host") {
        configuration.extend_from_slice(&["--host", &server_url]);
    }

    // Default to a short ramp to 2 users if not otherwise configured.
    if !configuration.contains(&"--stages") {
        configuration.extend_from_slice(&["--stages", "2,1s"]);
    }

    // Default to waiting up to 5 seconds for users to stop.
    if !configuration.contains(&"--graceful-stop") {
        configuration.extend_from_slice(&["--graceful-stop", "5s"]);
    }

    // Don't clutter test output with summaries.
    if !configuration.contains(&"--no-summary") {
        configuration.push("--no-summary");
    }

    // Don't write the default report file unless configured.
    if !configuration.contains(&"--report-file") && !configuration.contains(&"--no-report-file")
    {
        configuration.push("--no-report-file");
    }

    // Parse these options to generate a Configuration.
    Configuration::parse_args_default(&configuration)
        .expect("failed to parse options and generate a configuration")
}

/// Run the time API load test with the configuration, returning the final metrics.
#[allow(dead_code)]
pub async fn run_load_test(configuration: Configuration) -> LoadTestMetrics {
    let load_test = LoadTest::initialize_with_config(configuration).unwrap();
    scenario::time_api_load_test(load_test)
        .unwrap()
        .execute()
        .await
        .unwrap()
}

/// A unique path in the temporary directory, so that tests running in parallel don't
/// collide.
#[allow(dead_code)]
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("timeapi-loadtest-{}-{}", std::process::id(), name))
}
