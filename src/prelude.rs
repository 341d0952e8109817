pub use crate::metrics::{LoadTestMetrics, MetricsSink, Rate, Trend};
pub use crate::options::RunOptions;
pub use crate::test_plan::{Stage, TestPlan};
pub use crate::threshold::{Threshold, ThresholdStatus};
pub use crate::user::{
    Iteration, IterationError, IterationResult, ParsedBody, RequestParams, RequestResult,
    VirtualUser,
};
pub use crate::{scenario, LoadTest, LoadTestError};
pub use async_trait::async_trait;
