//! The condensed text summary printed to stdout when the load test ends.

use colored::{Color, Colorize};
use std::fmt::Write;

use crate::metrics::{LoadTestMetrics, CHECKS};
use crate::report::common::{format_rate, metric_values};
use crate::threshold::ThresholdStatus;
use crate::util;

/// Metric names are padded with dots to this width.
const NAME_WIDTH: usize = 32;

// Colorize only when enabled, so that summaries written to files stay plain.
fn paint(text: &str, color: Color, enabled: bool) -> String {
    if enabled {
        text.color(color).to_string()
    } else {
        text.to_string()
    }
}

fn dim(text: &str, enabled: bool) -> String {
    if enabled {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Render the summary. Every line starts with `indent`.
pub fn text_summary(metrics: &LoadTestMetrics, indent: &str, colors: bool) -> String {
    let mut summary = String::new();
    // Writing to a String never fails.
    let _ = write_summary(&mut summary, metrics, indent, colors);
    summary
}

fn write_summary(
    out: &mut String,
    metrics: &LoadTestMetrics,
    indent: &str,
    colors: bool,
) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "{}{} {}", indent, dim("host:", colors), metrics.host)?;
    writeln!(
        out,
        "{}{} {} over {}, up to {} users",
        indent,
        dim("plan:", colors),
        metrics.test_plan,
        util::format_timespan(metrics.test_plan.total_duration().as_secs() as usize),
        util::format_number(metrics.test_plan.max_users()),
    )?;
    writeln!(
        out,
        "{}{} {}",
        indent,
        dim("duration:", colors),
        util::format_duration(metrics.duration * 1_000.0)
    )?;
    writeln!(out)?;

    // Checks, each with its pass/fail counts when any failed.
    for (name, check) in &metrics.checks {
        if check.fails == 0 {
            writeln!(out, "{}{}", indent, paint(&format!("✓ {}", name), Color::Green, colors))?;
        } else {
            writeln!(out, "{}{}", indent, paint(&format!("✗ {}", name), Color::Red, colors))?;
            writeln!(
                out,
                "{}  {}",
                indent,
                paint(
                    &format!(
                        "↳  {} - ✓ {} / ✗ {}",
                        check.rate().map(format_rate).unwrap_or_default(),
                        util::format_number(check.passes),
                        util::format_number(check.fails),
                    ),
                    Color::Red,
                    colors
                )
            )?;
        }
    }
    if !metrics.checks.is_empty() {
        writeln!(out)?;
    }

    // Checks first, then every other metric in name order.
    let ordered = metrics
        .metrics
        .get(CHECKS)
        .into_iter()
        .chain(metrics.metrics.values().filter(|m| m.definition.name != CHECKS));
    for metric in ordered {
        let name = util::truncate_string(&metric.definition.name, NAME_WIDTH);
        let mut results = metrics.thresholds_for(&metric.definition.name).peekable();
        let marker = if results.peek().is_none() {
            " ".to_string()
        } else if results.all(|result| result.status != ThresholdStatus::Failed) {
            paint("✓", Color::Green, colors)
        } else {
            paint("✗", Color::Red, colors)
        };

        let dots = ".".repeat(NAME_WIDTH.saturating_sub(name.chars().count()));
        let values = metric_values(metric, metrics.duration)
            .into_iter()
            .map(|(label, value)| match label.as_str() {
                "✓" | "✗" => format!("{} {}", label, paint(&value, Color::Cyan, colors)),
                "count" => paint(&value, Color::Cyan, colors),
                _ => format!("{}={}", label, paint(&value, Color::Cyan, colors)),
            })
            .collect::<Vec<String>>()
            .join(" ");
        writeln!(
            out,
            "{}{} {}{}: {}",
            indent,
            marker,
            name,
            dim(&dots, colors),
            values
        )?;
    }

    // Threshold details.
    if !metrics.thresholds.is_empty() {
        writeln!(out)?;
        for result in &metrics.thresholds {
            let observed = result
                .observed
                .map(|value| util::round_to(value, 4).to_string())
                .unwrap_or_else(|| "no data".to_string());
            let line = format!(
                "{} {}: {} (observed {})",
                match result.status {
                    ThresholdStatus::Failed => "✗",
                    _ => "✓",
                },
                result.metric,
                result.expression,
                observed
            );
            let color = match result.status {
                ThresholdStatus::Passed => Color::Green,
                ThresholdStatus::Failed => Color::Red,
                ThresholdStatus::NoData => Color::Yellow,
            };
            writeln!(out, "{}{}", indent, paint(&line, color, colors))?;
        }
    }

    writeln!(out)?;
    if metrics.thresholds_passed() {
        writeln!(out, "{}{}", indent, paint("thresholds passed", Color::Green, colors))?;
    } else {
        writeln!(
            out,
            "{}{}",
            indent,
            paint("some thresholds have failed", Color::Red, colors)
        )?;
    }
    Ok(())
}
