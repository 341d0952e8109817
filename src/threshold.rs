//! Pass/fail criteria evaluated against the final metrics.
//!
//! A threshold pairs a metric name with an expression such as `p(95)<5700` or
//! `rate<0.05`. Every threshold is evaluated once, after all users have stopped. If any
//! threshold fails the load test as a whole is marked failed.
//!
//! ```rust
//! use timeapi_loadtest::threshold::Threshold;
//!
//! let threshold: Threshold = "GET_Duration:p(95)<5700".parse().unwrap();
//! assert_eq!(threshold.metric, "GET_Duration");
//! assert_eq!(threshold.expression.to_string(), "p(95)<5700");
//! ```

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::metrics::{LoadTestMetrics, MetricAggregate, MetricDefinition, MetricKind};
use crate::LoadTestError;

lazy_static! {
    static ref EXPRESSION: Regex = Regex::new(
        r"^\s*(avg|min|max|med|count|rate|value|p\(\s*(\d+(?:\.\d+)?)\s*\))\s*(<=|>=|===|==|!=|<|>)\s*(-?\d+(?:\.\d+)?)\s*$"
    )
    .expect("failed to compile threshold regex");
}

/// How a metric is reduced to a single number before being compared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    /// A percentile, from 0 to 100.
    Percentile(f64),
    Count,
    Rate,
    Value,
}
impl Aggregation {
    /// Whether this aggregation can be computed for a metric of `kind`.
    pub fn supports(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Trend => matches!(
                self,
                Aggregation::Avg
                    | Aggregation::Min
                    | Aggregation::Max
                    | Aggregation::Med
                    | Aggregation::Percentile(_)
                    | Aggregation::Count
            ),
            MetricKind::Rate => matches!(self, Aggregation::Rate),
            MetricKind::Counter => matches!(self, Aggregation::Count | Aggregation::Rate),
            MetricKind::Gauge => matches!(self, Aggregation::Value),
        }
    }

    /// Reduce an aggregate to the value this aggregation observes.
    ///
    /// Returns `None` when there is nothing to observe, for example a trend with no
    /// samples or a counter rate over a zero length test.
    pub fn observe(&self, aggregate: &MetricAggregate, duration: f64) -> Option<f64> {
        match (aggregate, self) {
            (MetricAggregate::Trend(trend), Aggregation::Avg) => trend.avg(),
            (MetricAggregate::Trend(trend), Aggregation::Min) => trend.min(),
            (MetricAggregate::Trend(trend), Aggregation::Max) => trend.max(),
            (MetricAggregate::Trend(trend), Aggregation::Med) => trend.med(),
            (MetricAggregate::Trend(trend), Aggregation::Percentile(percent)) => {
                trend.percentile(percent / 100.0)
            }
            (MetricAggregate::Trend(trend), Aggregation::Count) => Some(trend.samples as f64),
            (MetricAggregate::Rate(rate), Aggregation::Rate) => rate.rate(),
            (MetricAggregate::Counter(counter), Aggregation::Count) => Some(counter.total),
            (MetricAggregate::Counter(counter), Aggregation::Rate) => {
                (duration > 0.0).then(|| counter.per_second(duration))
            }
            (MetricAggregate::Gauge(gauge), Aggregation::Value) => {
                (gauge.samples > 0).then_some(gauge.value)
            }
            _ => None,
        }
    }
}
impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Percentile(percent) => write!(f, "p({})", percent),
            Aggregation::Count => write!(f, "count"),
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Value => write!(f, "value"),
        }
    }
}

/// How the observed value is compared to the bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparison {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
}
impl Comparison {
    pub fn compare(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Less => observed < bound,
            Comparison::LessOrEqual => observed <= bound,
            Comparison::Greater => observed > bound,
            Comparison::GreaterOrEqual => observed >= bound,
            Comparison::Equal => (observed - bound).abs() < f64::EPSILON,
            Comparison::NotEqual => (observed - bound).abs() >= f64::EPSILON,
        }
    }
}
impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let operator = match self {
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Equal => "==",
            Comparison::NotEqual => "!=",
        };
        write!(f, "{}", operator)
    }
}

/// A parsed `aggregation comparison bound` expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}
impl FromStr for ThresholdExpr {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |detail: &str| LoadTestError::InvalidThreshold {
            threshold: s.to_string(),
            detail: detail.to_string(),
        };
        let captures = EXPRESSION.captures(s).ok_or_else(|| {
            invalid("expected an aggregation, a comparison and a number, for example \"p(95)<5700\"")
        })?;

        let aggregation = match &captures[1] {
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "med" => Aggregation::Med,
            "count" => Aggregation::Count,
            "rate" => Aggregation::Rate,
            "value" => Aggregation::Value,
            _ => {
                let percent = captures
                    .get(2)
                    .and_then(|percent| percent.as_str().parse::<f64>().ok())
                    .ok_or_else(|| invalid("invalid percentile"))?;
                if percent > 100.0 {
                    return Err(invalid("percentile must be between 0 and 100"));
                }
                Aggregation::Percentile(percent)
            }
        };
        let comparison = match &captures[3] {
            "<" => Comparison::Less,
            "<=" => Comparison::LessOrEqual,
            ">" => Comparison::Greater,
            ">=" => Comparison::GreaterOrEqual,
            "!=" => Comparison::NotEqual,
            _ => Comparison::Equal,
        };
        let bound = captures[4]
            .parse::<f64>()
            .map_err(|_| invalid("invalid bound"))?;

        Ok(ThresholdExpr {
            aggregation,
            comparison,
            bound,
        })
    }
}
impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.comparison, self.bound)
    }
}

/// A pass/fail criterion on one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threshold {
    pub metric: String,
    pub expression: ThresholdExpr,
}
impl Threshold {
    /// Declare a threshold on `metric`.
    ///
    /// # Example
    /// ```rust
    /// use timeapi_loadtest::threshold::Threshold;
    ///
    /// assert!(Threshold::new("http_req_failed", "rate<0.05").is_ok());
    /// assert!(Threshold::new("http_req_failed", "rate<<0.05").is_err());
    /// ```
    pub fn new(metric: &str, expression: &str) -> Result<Self, LoadTestError> {
        Ok(Threshold {
            metric: metric.to_string(),
            expression: expression.parse()?,
        })
    }

    /// Confirm the metric was declared and the aggregation suits its kind.
    pub(crate) fn validate(
        &self,
        definitions: &BTreeMap<String, MetricDefinition>,
    ) -> Result<(), LoadTestError> {
        let definition =
            definitions
                .get(&self.metric)
                .ok_or_else(|| LoadTestError::InvalidThreshold {
                    threshold: self.to_string(),
                    detail: format!("no metric named {} was declared", self.metric),
                })?;
        if !self.expression.aggregation.supports(definition.kind) {
            return Err(LoadTestError::InvalidThreshold {
                threshold: self.to_string(),
                detail: format!(
                    "{} cannot be computed for {} metric {}",
                    self.expression.aggregation, definition.kind, self.metric
                ),
            });
        }
        Ok(())
    }

    /// Evaluate against the final metrics.
    ///
    /// A metric with no samples is reported as [`ThresholdStatus::NoData`], which does not
    /// fail the load test.
    pub fn evaluate(&self, metrics: &LoadTestMetrics) -> ThresholdResult {
        let observed = metrics.metric(&self.metric).and_then(|metric| {
            if metric.aggregate.samples() == 0 {
                None
            } else {
                self.expression
                    .aggregation
                    .observe(&metric.aggregate, metrics.duration)
            }
        });

        let status = match observed {
            Some(value) if self.expression.comparison.compare(value, self.expression.bound) => {
                ThresholdStatus::Passed
            }
            Some(value) => {
                info!("threshold {} failed: observed {}", self, value);
                ThresholdStatus::Failed
            }
            None => {
                warn!("threshold {} has no data to evaluate", self);
                ThresholdStatus::NoData
            }
        };

        ThresholdResult {
            metric: self.metric.clone(),
            expression: self.expression.to_string(),
            observed,
            status,
        }
    }
}

/// Parse `"metric:expression"`, the form accepted by `--threshold`.
impl FromStr for Threshold {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((metric, expression)) if !metric.trim().is_empty() => {
                Threshold::new(metric.trim(), expression)
            }
            _ => Err(LoadTestError::InvalidThreshold {
                threshold: s.to_string(),
                detail: "expected \"METRIC:EXPRESSION\", for example \"http_req_failed:rate<0.05\""
                    .to_string(),
            }),
        }
    }
}
impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.metric, self.expression)
    }
}

/// The outcome of a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStatus {
    Passed,
    Failed,
    /// The metric had no samples.
    NoData,
}

/// A threshold together with what was observed when it was evaluated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub status: ThresholdStatus,
}
impl ThresholdResult {
    /// Only a failed threshold fails the load test.
    pub fn passed(&self) -> bool {
        self.status != ThresholdStatus::Failed
    }
}
