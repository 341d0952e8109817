//! Metrics collected while the load test runs.
//!
//! Virtual users never touch an accumulator directly. Each user is handed a
//! [`MetricsSink`] when it is spawned and sends immutable [`Sample`]s through it. The
//! parent loop owns the single [`LoadTestMetrics`] structure, receives every sample and
//! folds it into the aggregate for the named metric.
//!
//! Four kinds of metrics are supported:
//!  - [`MetricKind::Counter`]: a running total, for example `http_reqs`.
//!  - [`MetricKind::Gauge`]: the last value set, for example `vus`.
//!  - [`MetricKind::Rate`]: the share of samples that were true, for example `http_req_failed`.
//!  - [`MetricKind::Trend`]: every value, for percentiles, for example `http_req_duration`.

use chrono::prelude::*;
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::test_plan::{StageHistory, TestPlan};
use crate::threshold::{Threshold, ThresholdResult};

/// Total number of requests made.
pub const HTTP_REQS: &str = "http_reqs";
/// How long each request took, in milliseconds.
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
/// Share of requests that returned an unexpected status or failed to complete.
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
/// Share of checks that passed.
pub const CHECKS: &str = "checks";
/// Total number of completed iterations.
pub const ITERATIONS: &str = "iterations";
/// How long each iteration took, in milliseconds.
pub const ITERATION_DURATION: &str = "iteration_duration";
/// Response body bytes received.
pub const DATA_RECEIVED: &str = "data_received";
/// How many virtual users are currently running.
pub const VUS: &str = "vus";
/// The largest number of virtual users the test plan asks for.
pub const VUS_MAX: &str = "vus_max";

/// Tag naming the request a sample belongs to.
pub const TAG_NAME: &str = "name";
/// Tag naming the request method.
pub const TAG_METHOD: &str = "method";
/// Tag holding the response status code.
pub const TAG_STATUS: &str = "status";
/// Tag recording whether the status was one the request expected.
pub const TAG_EXPECTED_RESPONSE: &str = "expected_response";
/// Tag naming the check a `checks` sample belongs to.
pub const TAG_CHECK: &str = "check";

/// The kinds of metric that can be declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

/// The name and kind of a metric, fixed for the whole load test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDefinition {
    pub name: String,
    pub kind: MetricKind,
    /// Trend values are durations in milliseconds, used when formatting.
    pub is_time: bool,
}
impl MetricDefinition {
    pub fn new(name: &str, kind: MetricKind, is_time: bool) -> Self {
        MetricDefinition {
            name: name.to_string(),
            kind,
            is_time,
        }
    }
}

/// The metrics every load test tracks without being asked.
pub fn builtin_metrics() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new(HTTP_REQS, MetricKind::Counter, false),
        MetricDefinition::new(HTTP_REQ_DURATION, MetricKind::Trend, true),
        MetricDefinition::new(HTTP_REQ_FAILED, MetricKind::Rate, false),
        MetricDefinition::new(CHECKS, MetricKind::Rate, false),
        MetricDefinition::new(ITERATIONS, MetricKind::Counter, false),
        MetricDefinition::new(ITERATION_DURATION, MetricKind::Trend, true),
        MetricDefinition::new(DATA_RECEIVED, MetricKind::Counter, false),
        MetricDefinition::new(VUS, MetricKind::Gauge, false),
        MetricDefinition::new(VUS_MAX, MetricKind::Gauge, false),
    ]
}

/// One observation of a metric, sent from a virtual user to the parent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// The name of the metric this sample is added to.
    pub metric: String,
    /// The observed value. Rates use 1.0 for true and 0.0 for false.
    pub value: f64,
    /// Optional tags, used to break built-in metrics down per request and per check.
    pub tags: BTreeMap<String, String>,
}
impl Sample {
    pub fn new(metric: &str, value: f64) -> Self {
        Sample {
            metric: metric.to_string(),
            value,
            tags: BTreeMap::new(),
        }
    }

    /// Create a sample for a rate metric.
    pub fn rate(metric: &str, passed: bool) -> Self {
        Sample::new(metric, if passed { 1.0 } else { 0.0 })
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// The sending half of the channel every virtual user reports samples through.
#[derive(Debug, Clone)]
pub struct MetricsSink {
    sender: flume::Sender<Sample>,
}
impl MetricsSink {
    /// Create a sink and the receiver the parent drains.
    pub fn channel() -> (MetricsSink, flume::Receiver<Sample>) {
        let (sender, receiver) = flume::unbounded();
        (MetricsSink { sender }, receiver)
    }

    /// Send a sample to the parent.
    ///
    /// Samples sent after the parent stopped listening are dropped.
    pub fn add(&self, sample: Sample) {
        if let Err(e) = self.sender.send(sample) {
            debug!("dropping sample for {}: parent no longer listening", e.0.metric);
        }
    }
}

/// Handle to a custom trend metric.
///
/// Handles are cheap immutable descriptors: adding a value sends a [`Sample`] through the
/// caller's [`MetricsSink`], the accumulator itself lives in the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trend {
    name: String,
}
impl Trend {
    pub(crate) fn new(name: &str) -> Self {
        Trend {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, sink: &MetricsSink, value: f64) {
        sink.add(Sample::new(&self.name, value));
    }
}

/// Handle to a custom rate metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rate {
    name: String,
}
impl Rate {
    pub(crate) fn new(name: &str) -> Self {
        Rate {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&self, sink: &MetricsSink, passed: bool) {
        sink.add(Sample::rate(&self.name, passed));
    }
}

/// A running total.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CounterAggregate {
    pub total: f64,
    pub samples: usize,
}
impl CounterAggregate {
    pub fn add(&mut self, value: f64) {
        self.total += value;
        self.samples += 1;
    }

    /// The total divided by the test duration, 0 when no time has passed.
    pub fn per_second(&self, seconds: f64) -> f64 {
        if seconds > 0.0 {
            self.total / seconds
        } else {
            0.0
        }
    }
}

/// The most recently set value, along with the extremes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GaugeAggregate {
    pub value: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub samples: usize,
}
impl GaugeAggregate {
    pub fn set(&mut self, value: f64) {
        if self.samples == 0 || value < self.minimum {
            self.minimum = value;
        }
        if self.samples == 0 || value > self.maximum {
            self.maximum = value;
        }
        self.value = value;
        self.samples += 1;
    }
}

/// Counts of true and false samples. Also used for individual checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateAggregate {
    pub passes: usize,
    pub fails: usize,
}
impl RateAggregate {
    pub fn add(&mut self, passed: bool) {
        if passed {
            self.passes += 1;
        } else {
            self.fails += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.passes + self.fails
    }

    /// The share of true samples, or `None` before anything was recorded.
    pub fn rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.passes as f64 / total as f64),
        }
    }
}

/// Every value recorded for a trend.
///
/// Values are kept in a histogram keyed by the whole unit below the value (milliseconds
/// for time trends), which keeps memory bounded regardless of how many requests are made.
/// Each bucket remembers the largest value it holds, so a percentile never reports more
/// than a value that was actually seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendAggregate {
    pub values: BTreeMap<usize, TrendBucket>,
    pub samples: usize,
    pub total: f64,
    pub minimum: f64,
    pub maximum: f64,
}
impl TrendAggregate {
    pub fn add(&mut self, value: f64) {
        if self.samples == 0 || value < self.minimum {
            self.minimum = value;
        }
        if self.samples == 0 || value > self.maximum {
            self.maximum = value;
        }
        self.total += value;
        self.samples += 1;

        let bucket = if value > 0.0 { value.floor() as usize } else { 0 };
        self.values.entry(bucket).or_default().add(value);
    }

    pub fn avg(&self) -> Option<f64> {
        match self.samples {
            0 => None,
            samples => Some(self.total / samples as f64),
        }
    }

    pub fn min(&self) -> Option<f64> {
        (self.samples > 0).then_some(self.minimum)
    }

    pub fn max(&self) -> Option<f64> {
        (self.samples > 0).then_some(self.maximum)
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(0.5)
    }

    /// Get the value at the requested percentile, by nearest rank.
    ///
    /// `percent` is a fraction: `0.95` for the 95th percentile. The result is the largest
    /// value in the histogram bucket holding that rank, which is within one unit of the
    /// exact percentile.
    ///
    /// # Example
    /// ```rust
    /// use timeapi_loadtest::metrics::TrendAggregate;
    ///
    /// let mut trend = TrendAggregate::default();
    /// for value in 1..=100 {
    ///     trend.add(value as f64);
    /// }
    /// assert_eq!(trend.percentile(0.95), Some(95.0));
    /// assert_eq!(trend.percentile(0.5), Some(50.0));
    /// assert_eq!(TrendAggregate::default().percentile(0.95), None);
    /// ```
    pub fn percentile(&self, percent: f64) -> Option<f64> {
        if self.samples == 0 {
            return None;
        }
        // Guard against products like 0.9 * 10 landing a hair above the whole rank.
        let rank = ((self.samples as f64 * percent - 1e-9).ceil() as usize).clamp(1, self.samples);
        let mut seen = 0;
        for bucket in self.values.values() {
            seen += bucket.count;
            if seen >= rank {
                return Some(bucket.maximum);
            }
        }
        Some(self.maximum)
    }
}

/// One whole unit of a [`TrendAggregate`] histogram.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendBucket {
    pub count: usize,
    /// The largest value added to this bucket.
    pub maximum: f64,
}
impl TrendBucket {
    fn add(&mut self, value: f64) {
        if self.count == 0 || value > self.maximum {
            self.maximum = value;
        }
        self.count += 1;
    }
}

/// The accumulator behind one metric, shaped by its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricAggregate {
    Counter(CounterAggregate),
    Gauge(GaugeAggregate),
    Rate(RateAggregate),
    Trend(TrendAggregate),
}
impl MetricAggregate {
    pub fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricAggregate::Counter(CounterAggregate::default()),
            MetricKind::Gauge => MetricAggregate::Gauge(GaugeAggregate::default()),
            MetricKind::Rate => MetricAggregate::Rate(RateAggregate::default()),
            MetricKind::Trend => MetricAggregate::Trend(TrendAggregate::default()),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricAggregate::Counter(_) => MetricKind::Counter,
            MetricAggregate::Gauge(_) => MetricKind::Gauge,
            MetricAggregate::Rate(_) => MetricKind::Rate,
            MetricAggregate::Trend(_) => MetricKind::Trend,
        }
    }

    /// How many samples were folded into this aggregate.
    pub fn samples(&self) -> usize {
        match self {
            MetricAggregate::Counter(counter) => counter.samples,
            MetricAggregate::Gauge(gauge) => gauge.samples,
            MetricAggregate::Rate(rate) => rate.total(),
            MetricAggregate::Trend(trend) => trend.samples,
        }
    }

    pub fn add(&mut self, value: f64) {
        match self {
            MetricAggregate::Counter(counter) => counter.add(value),
            MetricAggregate::Gauge(gauge) => gauge.set(value),
            MetricAggregate::Rate(rate) => rate.add(value != 0.0),
            MetricAggregate::Trend(trend) => trend.add(value),
        }
    }
}

/// A declared metric together with everything recorded for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub definition: MetricDefinition,
    pub aggregate: MetricAggregate,
}

/// Per-request statistics, keyed by request name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestAggregate {
    pub name: String,
    pub method: String,
    pub requests: usize,
    /// Requests answered with a status the request did not expect, or not answered.
    pub failures: usize,
    pub status_codes: BTreeMap<u16, usize>,
    pub duration: TrendAggregate,
}
impl RequestAggregate {
    fn new(name: &str, method: &str) -> Self {
        RequestAggregate {
            name: name.to_string(),
            method: method.to_string(),
            ..Default::default()
        }
    }

    /// Status codes and how often each was seen, most frequent first.
    pub fn status_code_summary(&self) -> String {
        self.status_codes
            .iter()
            .sorted_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)))
            .map(|(status, count)| format!("{} [{}]", crate::util::format_number(*count), status))
            .join(", ")
    }
}

/// Everything measured during a load test, returned by
/// [`LoadTest::execute`](../struct.LoadTest.html#method.execute).
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadTestMetrics {
    /// The host that was load tested.
    pub host: String,
    /// When the first user started.
    pub started: Option<DateTime<Local>>,
    /// When the last user stopped.
    pub stopped: Option<DateTime<Local>>,
    /// How long the load test ran, in seconds.
    pub duration: f64,
    /// The ramp that was executed.
    pub test_plan: TestPlan,
    /// Aggregates for every declared metric, keyed by metric name.
    pub metrics: BTreeMap<String, Metric>,
    /// Pass and fail counts for every check, keyed by check name.
    pub checks: BTreeMap<String, RateAggregate>,
    /// Statistics for every request, keyed by request name.
    pub requests: BTreeMap<String, RequestAggregate>,
    /// When each stage started.
    pub history: Vec<StageHistory>,
    /// The outcome of every threshold, filled in once the load test ends.
    pub thresholds: Vec<ThresholdResult>,
}
impl LoadTestMetrics {
    /// Prepare empty aggregates for every declared metric.
    pub(crate) fn initialize(
        host: &str,
        test_plan: &TestPlan,
        definitions: &[MetricDefinition],
    ) -> Self {
        let metrics = definitions
            .iter()
            .map(|definition| {
                (
                    definition.name.clone(),
                    Metric {
                        definition: definition.clone(),
                        aggregate: MetricAggregate::new(definition.kind),
                    },
                )
            })
            .collect();
        let mut load_test_metrics = LoadTestMetrics {
            host: host.to_string(),
            test_plan: test_plan.clone(),
            metrics,
            ..Default::default()
        };
        load_test_metrics.record(Sample::new(VUS_MAX, test_plan.max_users() as f64));
        load_test_metrics
    }

    /// Fold a sample into its metric, and into the per-request and per-check breakdowns.
    pub fn record(&mut self, sample: Sample) {
        match sample.metric.as_str() {
            HTTP_REQS => {
                if let Some(name) = sample.tag(TAG_NAME) {
                    let method = sample.tag(TAG_METHOD).unwrap_or("GET");
                    let request = self
                        .requests
                        .entry(name.to_string())
                        .or_insert_with(|| RequestAggregate::new(name, method));
                    request.requests += 1;
                    if sample.tag(TAG_EXPECTED_RESPONSE) == Some("false") {
                        request.failures += 1;
                    }
                    let status = sample
                        .tag(TAG_STATUS)
                        .and_then(|status| status.parse::<u16>().ok())
                        .unwrap_or(0);
                    *request.status_codes.entry(status).or_insert(0) += 1;
                }
            }
            HTTP_REQ_DURATION => {
                if let Some(request) = sample
                    .tag(TAG_NAME)
                    .and_then(|name| self.requests.get_mut(name))
                {
                    request.duration.add(sample.value);
                }
            }
            CHECKS => {
                if let Some(check) = sample.tag(TAG_CHECK) {
                    self.checks
                        .entry(check.to_string())
                        .or_default()
                        .add(sample.value != 0.0);
                }
            }
            _ => (),
        }

        match self.metrics.get_mut(&sample.metric) {
            Some(metric) => metric.aggregate.add(sample.value),
            None => warn!("ignoring sample for undeclared metric {}", sample.metric),
        }
    }

    /// Record how many users are currently running.
    pub(crate) fn record_vus(&mut self, users: usize) {
        self.record(Sample::new(VUS, users as f64));
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name)
    }

    pub fn trend(&self, name: &str) -> Option<&TrendAggregate> {
        match self.metrics.get(name).map(|metric| &metric.aggregate) {
            Some(MetricAggregate::Trend(trend)) => Some(trend),
            _ => None,
        }
    }

    pub fn rate(&self, name: &str) -> Option<&RateAggregate> {
        match self.metrics.get(name).map(|metric| &metric.aggregate) {
            Some(MetricAggregate::Rate(rate)) => Some(rate),
            _ => None,
        }
    }

    pub fn counter(&self, name: &str) -> Option<&CounterAggregate> {
        match self.metrics.get(name).map(|metric| &metric.aggregate) {
            Some(MetricAggregate::Counter(counter)) => Some(counter),
            _ => None,
        }
    }

    pub fn gauge(&self, name: &str) -> Option<&GaugeAggregate> {
        match self.metrics.get(name).map(|metric| &metric.aggregate) {
            Some(MetricAggregate::Gauge(gauge)) => Some(gauge),
            _ => None,
        }
    }

    /// Evaluate every threshold against the final aggregates.
    pub(crate) fn evaluate_thresholds(&mut self, thresholds: &[Threshold]) {
        self.thresholds = thresholds
            .iter()
            .map(|threshold| threshold.evaluate(self))
            .collect();
    }

    /// The results of thresholds declared on one metric.
    pub fn thresholds_for<'a>(
        &'a self,
        metric: &'a str,
    ) -> impl Iterator<Item = &'a ThresholdResult> + 'a {
        self.thresholds
            .iter()
            .filter(move |result| result.metric == metric)
    }

    /// Returns false if any threshold failed.
    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(ThresholdResult::passed)
    }
}

/// Display the plain text summary, without colours.
impl fmt::Display for LoadTestMetrics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", crate::report::text::text_summary(self, " ", false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_plan::Stage;

    fn metrics() -> LoadTestMetrics {
        let mut definitions = builtin_metrics();
        definitions.push(MetricDefinition::new(
            "GET_Duration",
            MetricKind::Trend,
            true,
        ));
        definitions.push(MetricDefinition::new(
            "Rate_Status_OK",
            MetricKind::Rate,
            false,
        ));
        LoadTestMetrics::initialize(
            "http://127.0.0.1",
            &TestPlan::new(vec![Stage::new(1, 10)]),
            &definitions,
        )
    }

    #[test]
    fn trend_percentiles() {
        let mut trend = TrendAggregate::default();
        assert_eq!(trend.avg(), None);
        assert_eq!(trend.min(), None);
        for value in [5_800.0, 120.2, 95.0, 180.7] {
            trend.add(value);
        }
        assert_eq!(trend.samples, 4);
        assert_eq!(trend.min(), Some(95.0));
        assert_eq!(trend.max(), Some(5_800.0));
        assert!((trend.avg().unwrap() - 1_548.975).abs() < 1e-9);
        // Four samples: the 95th percentile is the fourth value.
        assert_eq!(trend.percentile(0.95), Some(5_800.0));
        assert_eq!(trend.med(), Some(120.2));
    }

    #[test]
    fn trend_percentile_stays_within_bucket() {
        let mut trend = TrendAggregate::default();
        trend.add(0.4);
        trend.add(0.3);
        // Both values land in the 0 bucket, which reports the largest of them.
        assert_eq!(trend.percentile(0.5), Some(0.4));
        assert_eq!(trend.percentile(1.0), Some(0.4));

        // Just below a bound, a slow outlier must not pull the 95th percentile up.
        let mut trend = TrendAggregate::default();
        for _ in 0..19 {
            trend.add(5_699.6);
        }
        trend.add(9_000.0);
        assert_eq!(trend.percentile(0.95), Some(5_699.6));
        assert_eq!(trend.percentile(1.0), Some(9_000.0));
    }

    #[test]
    fn rates() {
        let mut rate = RateAggregate::default();
        assert_eq!(rate.rate(), None);
        rate.add(true);
        rate.add(true);
        rate.add(true);
        rate.add(false);
        assert_eq!(rate.rate(), Some(0.75));
        assert_eq!(rate.total(), 4);
    }

    #[test]
    fn counters_and_gauges() {
        let mut counter = CounterAggregate::default();
        counter.add(3.0);
        counter.add(1.0);
        assert_eq!(counter.total, 4.0);
        assert_eq!(counter.per_second(2.0), 2.0);
        assert_eq!(counter.per_second(0.0), 0.0);

        let mut gauge = GaugeAggregate::default();
        gauge.set(5.0);
        gauge.set(10.0);
        gauge.set(2.0);
        assert_eq!(gauge.value, 2.0);
        assert_eq!(gauge.minimum, 2.0);
        assert_eq!(gauge.maximum, 10.0);
    }

    #[test]
    fn records_requests_and_checks() {
        let mut metrics = metrics();
        let request = |status: &str, expected: &str| {
            Sample::new(HTTP_REQS, 1.0)
                .with_tag(TAG_NAME, "/api/Time/invalid")
                .with_tag(TAG_METHOD, "GET")
                .with_tag(TAG_STATUS, status)
                .with_tag(TAG_EXPECTED_RESPONSE, expected)
        };
        metrics.record(request("404", "true"));
        metrics.record(request("404", "true"));
        metrics.record(request("0", "false"));
        metrics.record(
            Sample::new(HTTP_REQ_DURATION, 42.0).with_tag(TAG_NAME, "/api/Time/invalid"),
        );
        metrics.record(Sample::rate(CHECKS, true).with_tag(TAG_CHECK, "Status 404"));
        metrics.record(Sample::rate(CHECKS, false).with_tag(TAG_CHECK, "Status 404"));

        let request = &metrics.requests["/api/Time/invalid"];
        assert_eq!(request.requests, 3);
        assert_eq!(request.failures, 1);
        assert_eq!(request.status_codes[&404], 2);
        assert_eq!(request.status_code_summary(), "2 [404], 1 [0]");
        assert_eq!(request.duration.samples, 1);
        assert_eq!(metrics.counter(HTTP_REQS).unwrap().total, 3.0);
        assert_eq!(metrics.checks["Status 404"].passes, 1);
        assert_eq!(metrics.rate(CHECKS).unwrap().rate(), Some(0.5));
    }

    #[test]
    fn custom_metrics_through_sink() {
        let (sink, receiver) = MetricsSink::channel();
        let trend = Trend::new("GET_Duration");
        let rate = Rate::new("Rate_Status_OK");
        trend.add(&sink, 182.4);
        rate.add(&sink, true);
        rate.add(&sink, false);
        // Unknown metrics are ignored.
        sink.add(Sample::new("not_declared", 1.0));

        let mut metrics = metrics();
        for sample in receiver.drain() {
            metrics.record(sample);
        }
        assert_eq!(metrics.trend("GET_Duration").unwrap().samples, 1);
        assert_eq!(metrics.rate("Rate_Status_OK").unwrap().rate(), Some(0.5));
        assert!(metrics.metric("not_declared").is_none());
    }

    #[test]
    fn vus() {
        let mut metrics = metrics();
        assert_eq!(metrics.gauge(VUS_MAX).unwrap().value, 10.0);
        metrics.record_vus(3);
        metrics.record_vus(7);
        assert_eq!(metrics.gauge(VUS).unwrap().value, 7.0);
        assert_eq!(metrics.gauge(VUS).unwrap().minimum, 3.0);
    }
}
