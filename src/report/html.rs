//! The html report written when the load test ends.

use crate::metrics::{LoadTestMetrics, RequestAggregate};
use crate::report::common::{html_escape, metric_values};
use crate::threshold::ThresholdStatus;
use crate::util;

/// One row of the request table.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRow {
    pub method: String,
    pub name: String,
    pub number_of_requests: usize,
    pub number_of_failures: usize,
    pub response_time_average: String,
    pub response_time_minimum: String,
    pub response_time_maximum: String,
    pub requests_per_second: String,
    pub status_codes: String,
}
impl RequestRow {
    pub fn new(request: &RequestAggregate, duration: f64) -> Self {
        let time = |value: Option<f64>| value.map(util::format_duration).unwrap_or_default();
        let per_second = if duration > 0.0 {
            util::round_to(request.requests as f64 / duration, 2).to_string()
        } else {
            "0".to_string()
        };
        RequestRow {
            method: request.method.clone(),
            name: request.name.clone(),
            number_of_requests: request.requests,
            number_of_failures: request.failures,
            response_time_average: time(request.duration.avg()),
            response_time_minimum: time(request.duration.min()),
            response_time_maximum: time(request.duration.max()),
            requests_per_second: per_second,
            status_codes: request.status_code_summary(),
        }
    }
}

/// Percentiles shown in the response time table.
const PERCENTILES: [f64; 7] = [0.5, 0.75, 0.9, 0.95, 0.98, 0.99, 1.0];

/// One row of the response time table.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTimeRow {
    pub method: String,
    pub name: String,
    pub percentiles: Vec<String>,
}
impl ResponseTimeRow {
    pub fn new(request: &RequestAggregate) -> Self {
        ResponseTimeRow {
            method: request.method.clone(),
            name: request.name.clone(),
            percentiles: PERCENTILES
                .iter()
                .map(|percent| {
                    request
                        .duration
                        .percentile(*percent)
                        .map(util::format_duration)
                        .unwrap_or_default()
                })
                .collect(),
        }
    }
}

const STYLE: &str = r#"
        body {
            margin: 0;
            background: #eef2f5;
            font-family: Arial, Helvetica, sans-serif;
            font-size: 14px;
            color: #2b2b2b;
        }
        .container {
            max-width: 1100px;
            margin: 0 auto;
            padding: 16px;
        }
        header {
            background: #3b4d61;
            color: #fff;
            padding: 12px 16px;
        }
        header span {
            color: #c9d6e3;
        }
        .passed {
            color: #1c8c3c;
        }
        .failed {
            color: #c0392b;
        }
        .nodata {
            color: #b7950b;
        }
        table {
            border-collapse: collapse;
            width: 100%;
            margin-bottom: 24px;
            background: #fff;
        }
        td, th {
            border: 1px solid #d3dce6;
            padding: 6px 8px;
            text-align: left;
        }
        thead th {
            background-color: #dde6ee;
        }
        tr:nth-child(even) {
            background: #f7f9fb;
        }
"#;

// Render a table with a header row and body rows of already escaped cells.
fn table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let header = headers
        .iter()
        .map(|header| format!("<th>{}</th>", html_escape(header)))
        .collect::<String>();
    let body = rows
        .into_iter()
        .map(|row| {
            format!(
                "<tr>{}</tr>",
                row.into_iter()
                    .map(|cell| format!("<td>{}</td>", cell))
                    .collect::<String>()
            )
        })
        .collect::<Vec<String>>()
        .join("\n                ");
    format!(
        r#"<table>
            <thead><tr>{}</tr></thead>
            <tbody>
                {}
            </tbody>
        </table>"#,
        header, body
    )
}

fn status_cell(status: ThresholdStatus) -> String {
    let (class, label) = match status {
        ThresholdStatus::Passed => ("passed", "✓ passed"),
        ThresholdStatus::Failed => ("failed", "✗ failed"),
        ThresholdStatus::NoData => ("nodata", "no data"),
    };
    format!(r#"<span class="{}">{}</span>"#, class, label)
}

/// Render the html report.
pub fn html_report(metrics: &LoadTestMetrics) -> String {
    let timestamp = |time: Option<chrono::DateTime<chrono::Local>>| {
        time.map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default()
    };
    let (verdict_class, verdict) = if metrics.thresholds_passed() {
        ("passed", "Thresholds passed")
    } else {
        ("failed", "Some thresholds have failed")
    };

    let thresholds = table(
        &["Metric", "Threshold", "Observed", "Status"],
        metrics
            .thresholds
            .iter()
            .map(|result| {
                vec![
                    html_escape(&result.metric),
                    html_escape(&result.expression),
                    result
                        .observed
                        .map(|value| util::round_to(value, 4).to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    status_cell(result.status),
                ]
            })
            .collect(),
    );

    let checks = table(
        &["Check", "Passes", "Fails", "Rate"],
        metrics
            .checks
            .iter()
            .map(|(name, check)| {
                let class = if check.fails == 0 { "passed" } else { "failed" };
                vec![
                    format!(r#"<span class="{}">{}</span>"#, class, html_escape(name)),
                    util::format_number(check.passes),
                    util::format_number(check.fails),
                    check
                        .rate()
                        .map(crate::report::common::format_rate)
                        .unwrap_or_default(),
                ]
            })
            .collect(),
    );

    let all_metrics = table(
        &["Metric", "Type", "Values"],
        metrics
            .metrics
            .values()
            .map(|metric| {
                let values = metric_values(metric, metrics.duration)
                    .into_iter()
                    .map(|(label, value)| format!("{}={}", label, value))
                    .collect::<Vec<String>>()
                    .join(" ");
                vec![
                    html_escape(&metric.definition.name),
                    metric.definition.kind.to_string(),
                    html_escape(&values),
                ]
            })
            .collect(),
    );

    let requests = table(
        &[
            "Method", "Name", "# Requests", "# Fails", "Average", "Min", "Max", "RPS", "Status codes",
        ],
        metrics
            .requests
            .values()
            .map(|request| {
                let row = RequestRow::new(request, metrics.duration);
                vec![
                    row.method,
                    html_escape(&row.name),
                    util::format_number(row.number_of_requests),
                    util::format_number(row.number_of_failures),
                    row.response_time_average,
                    row.response_time_minimum,
                    row.response_time_maximum,
                    row.requests_per_second,
                    row.status_codes,
                ]
            })
            .collect(),
    );

    let response_times = table(
        &["Method", "Name", "50%", "75%", "90%", "95%", "98%", "99%", "100%"],
        metrics
            .requests
            .values()
            .map(|request| {
                let row = ResponseTimeRow::new(request);
                let mut cells = vec![row.method, html_escape(&row.name)];
                cells.extend(row.percentiles);
                cells
            })
            .collect(),
    );

    let stages = table(
        &["Stage", "Action", "Started", "Users"],
        metrics
            .history
            .iter()
            .map(|step| {
                vec![
                    (step.stage + 1).to_string(),
                    step.action.to_string(),
                    step.timestamp.format("%H:%M:%S").to_string(),
                    util::format_number(step.users),
                ]
            })
            .collect(),
    );

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Load Test Report</title>
    <style>{style}</style>
</head>
<body>
    <header>
        <h1>Load Test Report</h1>
        <p>During: <span>{started} - {stopped}</span> ({duration})</p>
        <p>Target Host: <span>{host}</span></p>
        <p>Stages: <span>{plan}</span></p>
    </header>
    <div class="container">
        <h2 class="{verdict_class}">{verdict}</h2>

        <h2>Thresholds</h2>
        {thresholds}

        <h2>Checks</h2>
        {checks}

        <h2>Metrics</h2>
        {all_metrics}

        <h2>Request Metrics</h2>
        {requests}

        <h2>Response Time Metrics</h2>
        {response_times}

        <h2>Stages</h2>
        {stages}
    </div>
</body>
</html>
"#,
        style = STYLE,
        started = timestamp(metrics.started),
        stopped = timestamp(metrics.stopped),
        duration = util::format_duration(metrics.duration * 1_000.0),
        host = html_escape(&metrics.host),
        plan = html_escape(&metrics.test_plan.to_string()),
        verdict_class = verdict_class,
        verdict = verdict,
        thresholds = thresholds,
        checks = checks,
        all_metrics = all_metrics,
        requests = requests,
        response_times = response_times,
        stages = stages,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{
        builtin_metrics, Sample, CHECKS, HTTP_REQS, HTTP_REQ_DURATION, TAG_CHECK,
        TAG_EXPECTED_RESPONSE, TAG_METHOD, TAG_NAME, TAG_STATUS,
    };
    use crate::test_plan::{Stage, TestPlan};
    use crate::threshold::Threshold;

    fn metrics() -> LoadTestMetrics {
        let mut metrics = LoadTestMetrics::initialize(
            "https://www.timeapi.io",
            &TestPlan::new(vec![Stage::new(60, 10)]),
            &builtin_metrics(),
        );
        metrics.duration = 2.0;
        for duration in [120.0, 180.0] {
            metrics.record(
                Sample::new(HTTP_REQS, 1.0)
                    .with_tag(TAG_NAME, "GET Time (Zone)")
                    .with_tag(TAG_METHOD, "GET")
                    .with_tag(TAG_STATUS, "200")
                    .with_tag(TAG_EXPECTED_RESPONSE, "true"),
            );
            metrics.record(
                Sample::new(HTTP_REQ_DURATION, duration).with_tag(TAG_NAME, "GET Time (Zone)"),
            );
        }
        metrics.record(
            Sample::rate(CHECKS, true).with_tag(TAG_CHECK, "GET Time (Zone) - Status 200"),
        );
        metrics
    }

    #[test]
    fn rows() {
        let metrics = metrics();
        let request = &metrics.requests["GET Time (Zone)"];
        let row = RequestRow::new(request, metrics.duration);
        assert_eq!(row.number_of_requests, 2);
        assert_eq!(row.number_of_failures, 0);
        assert_eq!(row.response_time_average, "150ms");
        assert_eq!(row.requests_per_second, "1");
        assert_eq!(row.status_codes, "2 [200]");

        let row = ResponseTimeRow::new(request);
        assert_eq!(row.percentiles.len(), PERCENTILES.len());
        assert_eq!(row.percentiles[0], "120ms");
        assert_eq!(row.percentiles[6], "180ms");
    }

    #[test]
    fn report() {
        let mut metrics = metrics();
        metrics.evaluate_thresholds(&[Threshold::new("http_req_duration", "p(95)<100").unwrap()]);
        let report = html_report(&metrics);
        assert!(report.starts_with("<!DOCTYPE html>"));
        assert!(report.contains("<p>Target Host: <span>https://www.timeapi.io</span></p>"));
        assert!(report.contains("Some thresholds have failed"));
        assert!(report.contains("<td>p(95)&lt;100</td>"));
        assert!(report.contains("GET Time (Zone) - Status 200"));
        assert!(report.contains("<td>GET Time (Zone)</td>"));
    }
}
