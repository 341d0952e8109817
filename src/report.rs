//! Summaries produced once the load test ends.
//!
//! After every user has stopped and thresholds have been evaluated, [`handle_summary`] is
//! invoked exactly once with the final [`LoadTestMetrics`]. It writes the html report
//! (creating parent directories as needed), optionally exports the summary as json, and
//! prints the condensed text summary to stdout.

pub mod common;
pub mod html;
pub mod json;
pub mod text;

use std::path::Path;

use crate::config::Configuration;
use crate::metrics::LoadTestMetrics;
use crate::LoadTestError;

/// Where and how summaries are produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryOptions {
    /// Write the html report to this path.
    pub report_file: Option<String>,
    /// Write the json summary to this path.
    pub summary_export: Option<String>,
    /// Print the text summary to stdout.
    pub print_summary: bool,
    /// Use terminal colors in the text summary.
    pub colors: bool,
    /// Every line of the text summary starts with this.
    pub indent: String,
}
impl SummaryOptions {
    pub(crate) fn from_configuration(configuration: &Configuration) -> Self {
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        SummaryOptions {
            report_file: non_empty(&configuration.report_file),
            summary_export: non_empty(&configuration.summary_export),
            print_summary: !configuration.no_summary,
            colors: !configuration.no_color,
            indent: " ".to_string(),
        }
    }
}

// Write a file, creating any missing parent directories first.
async fn write_file(path: &str, contents: String) -> Result<(), LoadTestError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// Produce every configured summary from the final metrics.
pub async fn handle_summary(
    metrics: &LoadTestMetrics,
    options: &SummaryOptions,
) -> Result<(), LoadTestError> {
    if let Some(report_file) = options.report_file.as_ref() {
        write_file(report_file, html::html_report(metrics)).await?;
        info!("wrote html report file to: {}", report_file);
    }

    if let Some(summary_export) = options.summary_export.as_ref() {
        let exported = serde_json::to_string_pretty(&json::summary_json(metrics))
            .map_err(|e| LoadTestError::InvalidOption {
                option: "--summary-export".to_string(),
                value: summary_export.to_string(),
                detail: format!("failed to serialize summary: {}", e),
            })?;
        write_file(summary_export, exported).await?;
        info!("exported summary to: {}", summary_export);
    }

    if options.print_summary {
        println!(
            "{}",
            text::text_summary(metrics, &options.indent, options.colors)
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gumdrop::Options;

    #[test]
    fn options_from_configuration() {
        let configuration = Configuration::parse_args_default(&[
            "--report-file",
            "report.html",
            "--no-color",
        ])
        .unwrap();
        let options = SummaryOptions::from_configuration(&configuration);
        assert_eq!(options.report_file.as_deref(), Some("report.html"));
        assert_eq!(options.summary_export, None);
        assert!(options.print_summary);
        assert!(!options.colors);
        assert_eq!(options.indent, " ");
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let directory = std::env::temp_dir().join(format!("timeapi-report-{}", std::process::id()));
        let report_file = directory.join("src").join("output").join("index.html");
        let export = directory.join("summary.json");
        let options = SummaryOptions {
            report_file: Some(report_file.to_string_lossy().to_string()),
            summary_export: Some(export.to_string_lossy().to_string()),
            print_summary: false,
            ..Default::default()
        };
        handle_summary(&LoadTestMetrics::default(), &options)
            .await
            .unwrap();

        let report = std::fs::read_to_string(&report_file).unwrap();
        assert!(report.contains("Load Test Report"));
        let exported: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
        assert_eq!(exported["thresholds_passed"], true);
        std::fs::remove_dir_all(&directory).unwrap();
    }
}
