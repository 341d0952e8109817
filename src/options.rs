//! The declarative run configuration of a load test.

use crate::test_plan::TestPlan;
use crate::threshold::Threshold;

/// Defaults for a load test, assembled once at startup.
///
/// Every field can be overridden from the command line: `--stages` replaces the test plan,
/// `--threshold` adds to the thresholds, `--host` and `--report-file` replace the host and
/// report path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    /// The ramp of concurrent users.
    pub test_plan: TestPlan,
    /// Criteria that must all hold for the load test to pass.
    pub thresholds: Vec<Threshold>,
    /// The host requests are made against.
    pub host: String,
    /// Where the html report is written, empty to not write one.
    pub report_file: String,
}
