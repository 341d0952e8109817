//! Machine readable summary export, enabled with `--summary-export`.

use serde_json::{json, Map, Value};

use crate::metrics::{LoadTestMetrics, MetricAggregate};
use crate::threshold::ThresholdStatus;

/// Build the exported summary.
///
/// Every metric is listed with its kind and aggregated values, and with the outcome of
/// each threshold declared on it. Checks are listed with their pass and fail counts.
pub fn summary_json(metrics: &LoadTestMetrics) -> Value {
    let mut exported = Map::new();
    for (name, metric) in &metrics.metrics {
        let values = match &metric.aggregate {
            MetricAggregate::Trend(trend) => json!({
                "count": trend.samples,
                "avg": trend.avg(),
                "min": trend.min(),
                "med": trend.med(),
                "max": trend.max(),
                "p(90)": trend.percentile(0.9),
                "p(95)": trend.percentile(0.95),
            }),
            MetricAggregate::Rate(rate) => json!({
                "rate": rate.rate(),
                "passes": rate.passes,
                "fails": rate.fails,
            }),
            MetricAggregate::Counter(counter) => json!({
                "count": counter.total,
                "rate": counter.per_second(metrics.duration),
            }),
            MetricAggregate::Gauge(gauge) => json!({
                "value": gauge.value,
                "min": gauge.minimum,
                "max": gauge.maximum,
            }),
        };

        let mut entry = json!({
            "type": metric.definition.kind,
            "contains": if metric.definition.is_time { "time" } else { "default" },
            "values": values,
        });
        let thresholds: Map<String, Value> = metrics
            .thresholds_for(name)
            .map(|result| {
                (
                    result.expression.clone(),
                    json!({
                        "ok": result.status != ThresholdStatus::Failed,
                        "status": result.status,
                        "observed": result.observed,
                    }),
                )
            })
            .collect();
        if !thresholds.is_empty() {
            entry["thresholds"] = Value::Object(thresholds);
        }
        exported.insert(name.clone(), entry);
    }

    let checks: Map<String, Value> = metrics
        .checks
        .iter()
        .map(|(name, check)| {
            (
                name.clone(),
                json!({ "passes": check.passes, "fails": check.fails }),
            )
        })
        .collect();

    json!({
        "host": metrics.host,
        "started": metrics.started,
        "stopped": metrics.stopped,
        "duration": metrics.duration,
        "stages": metrics.test_plan.to_string(),
        "metrics": exported,
        "checks": checks,
        "requests": metrics.requests,
        "thresholds_passed": metrics.thresholds_passed(),
    })
}
