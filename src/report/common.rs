//! Formatting shared by the text, html and json summaries.

use crate::metrics::{Metric, MetricAggregate};
use crate::util;

/// Format a metric value, as a duration when the metric measures time.
pub fn format_value(value: f64, is_time: bool) -> String {
    if is_time {
        util::format_duration(value)
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        let formatted = util::format_number(value.abs() as usize);
        if value < 0.0 {
            format!("-{}", formatted)
        } else {
            formatted
        }
    } else {
        util::round_to(value, 2).to_string()
    }
}

/// Format a rate as a percentage.
///
/// # Example
/// ```rust
/// use timeapi_loadtest::report::common::format_rate;
///
/// assert_eq!(format_rate(0.9875), "98.75%");
/// assert_eq!(format_rate(1.0), "100.00%");
/// ```
pub fn format_rate(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

/// The labelled values shown for a metric, in display order.
pub fn metric_values(metric: &Metric, duration: f64) -> Vec<(String, String)> {
    let is_time = metric.definition.is_time;
    let or_dash = |value: Option<f64>| {
        value
            .map(|value| format_value(value, is_time))
            .unwrap_or_else(|| "-".to_string())
    };
    match &metric.aggregate {
        MetricAggregate::Trend(trend) => vec![
            ("avg".to_string(), or_dash(trend.avg())),
            ("min".to_string(), or_dash(trend.min())),
            ("med".to_string(), or_dash(trend.med())),
            ("max".to_string(), or_dash(trend.max())),
            ("p(90)".to_string(), or_dash(trend.percentile(0.9))),
            ("p(95)".to_string(), or_dash(trend.percentile(0.95))),
        ],
        MetricAggregate::Rate(rate) => vec![
            (
                "rate".to_string(),
                rate.rate()
                    .map(format_rate)
                    .unwrap_or_else(|| "-".to_string()),
            ),
            ("✓".to_string(), util::format_number(rate.passes)),
            ("✗".to_string(), util::format_number(rate.fails)),
        ],
        MetricAggregate::Counter(counter) => vec![
            ("count".to_string(), format_value(counter.total, false)),
            (
                "rate".to_string(),
                format!("{}/s", util::round_to(counter.per_second(duration), 2)),
            ),
        ],
        MetricAggregate::Gauge(gauge) => vec![
            ("value".to_string(), format_value(gauge.value, false)),
            ("min".to_string(), format_value(gauge.minimum, false)),
            ("max".to_string(), format_value(gauge.maximum, false)),
        ],
    }
}

/// Escape text for inclusion in html.
pub fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricDefinition, MetricKind};

    #[test]
    fn values() {
        assert_eq!(format_value(1_234.0, false), "1,234");
        assert_eq!(format_value(-3.0, false), "-3");
        assert_eq!(format_value(0.125, false), "0.13");
        assert_eq!(format_value(182.456, true), "182.46ms");
    }

    #[test]
    fn trend_values() {
        let mut metric = Metric {
            definition: MetricDefinition::new("GET_Duration", MetricKind::Trend, true),
            aggregate: MetricAggregate::new(MetricKind::Trend),
        };
        let values = metric_values(&metric, 1.0);
        assert_eq!(values[0], ("avg".to_string(), "-".to_string()));

        for value in [100.0, 200.0, 300.0, 400.0] {
            metric.aggregate.add(value);
        }
        let values = metric_values(&metric, 1.0);
        let labels: Vec<&str> = values.iter().map(|(label, _)| label.as_str()).collect();
        assert_eq!(labels, vec!["avg", "min", "med", "max", "p(90)", "p(95)"]);
        assert_eq!(values[0].1, "250ms");
        assert_eq!(values[5].1, "400ms");
    }

    #[test]
    fn counter_values() {
        let mut metric = Metric {
            definition: MetricDefinition::new("http_reqs", MetricKind::Counter, false),
            aggregate: MetricAggregate::new(MetricKind::Counter),
        };
        for _ in 0..5 {
            metric.aggregate.add(1.0);
        }
        let values = metric_values(&metric, 2.0);
        assert_eq!(values[0].1, "5");
        assert_eq!(values[1].1, "2.5/s");
    }

    #[test]
    fn escape() {
        assert_eq!(
            html_escape("<b>\"GET\" & 'POST'</b>"),
            "&lt;b&gt;&quot;GET&quot; &amp; &#39;POST&#39;&lt;/b&gt;"
        );
    }
}
