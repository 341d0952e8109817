use timeapi_loadtest::prelude::*;

/// Exit code when the load test completed but a threshold failed.
const THRESHOLDS_FAILED: i32 = 99;

#[tokio::main]
async fn main() {
    let result = match LoadTest::initialize().and_then(scenario::time_api_load_test) {
        Ok(load_test) => load_test.execute().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(metrics) if !metrics.thresholds_passed() => std::process::exit(THRESHOLDS_FAILED),
        Ok(_) => (),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
