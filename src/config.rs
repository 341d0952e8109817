//! Functions and structures related to configuring the load test.
//!
//! The load test can be configured at run time by passing in the options and flags
//! defined by the [`Configuration`] structure. Anything not set on the command line falls
//! back to the [`RunOptions`] the load test was declared with.

use gumdrop::Options;
use simplelog::*;
use std::fmt;
use std::path::PathBuf;

use crate::logger::LogFormat;
use crate::options::RunOptions;
use crate::test_plan::TestPlan;
use crate::threshold::Threshold;
use crate::util;
use crate::LoadTestError;

/// How long users may take to finish their iteration once the load test ends.
pub const DEFAULT_GRACEFUL_STOP: &str = "30s";

/// Runtime options available when launching the load test.
///
/// Help is generated for all of these options by passing a `-h` flag. The help is derived
/// from this structure by [`gumdrop`](https://docs.rs/gumdrop/).
#[derive(Options, Debug, Clone, Default)]
#[options(
    help = r#"Load tests the timeapi.io time lookup API, ramping virtual users through a
series of stages and checking the results against thresholds.

The following runtime options are available:"#
)]
pub struct Configuration {
    /// Displays this help
    #[options(short = "h")]
    pub help: bool,
    /// Prints version information
    #[options(short = "V")]
    pub version: bool,
    /// Lists the test plan and thresholds and exits
    // Add a blank line after this option
    #[options(short = "l", help = "Lists the test plan and thresholds and exits\n")]
    pub list: bool,

    /// Defines host to load test (ie https://www.timeapi.io)
    #[options(short = "H")]
    pub host: String,
    /// Replaces the ramp (ie "10,60s;160,60s;300,2m")
    #[options(no_short, meta = "PLAN")]
    pub stages: Option<TestPlan>,
    /// Lets users finish their iteration for up to (30s, 1m, etc)
    #[options(no_short, meta = "TIME")]
    pub graceful_stop: String,
    /// Adds a threshold (ie "GET_Duration:p(95)<5700")
    #[options(no_short, meta = "METRIC:EXPR")]
    pub threshold: Vec<Threshold>,
    /// Disables all thresholds
    #[options(no_short, help = "Disables all thresholds\n")]
    pub no_thresholds: bool,

    /// Enables log file and sets name
    #[options(short = "G", meta = "NAME")]
    pub log_file: String,
    /// Increases log file level (-g, -gg, etc)
    #[options(short = "g", count)]
    pub log_level: u8,
    /// Decreases verbosity (-q, -qq, etc)
    #[options(count, short = "q", help = "Decreases verbosity (-q, -qq, etc)")]
    pub quiet: u8,
    /// Increases verbosity (-v, -vv, etc)
    #[options(
        count,
        short = "v",
        // Add a blank line and then a 'Reports:' header after this option
        help = "Increases verbosity (-v, -vv, etc)\n\nReports:"
    )]
    pub verbose: u8,

    /// Sets html report file name
    #[options(no_short, meta = "NAME")]
    pub report_file: String,
    /// Doesn't write an html report
    #[options(no_short)]
    pub no_report_file: bool,
    /// Exports the summary as json and sets file name
    #[options(no_short, meta = "NAME")]
    pub summary_export: String,
    /// Doesn't print the summary at end of load test
    #[options(no_short)]
    pub no_summary: bool,
    /// Doesn't use colors in the summary
    #[options(no_short)]
    pub no_color: bool,
    /// Sets request log file name
    #[options(short = "R", meta = "NAME")]
    pub request_log: String,
    /// Sets request log format (json, csv, raw, pretty)
    #[options(no_short, meta = "FORMAT")]
    pub request_format: Option<LogFormat>,
}

/// One candidate for a configuration value, tried in order by [`get_value`].
pub(crate) struct ConfigValue<'a, T> {
    /// The optional value to set.
    pub(crate) value: Option<T>,
    /// Skip this candidate if true.
    pub(crate) filter: bool,
    /// An optional INFO level log message.
    pub(crate) message: &'a str,
}

/// Return the first candidate that is set and not filtered.
pub(crate) fn get_value<T: fmt::Debug>(values: Vec<ConfigValue<T>>) -> Option<T> {
    for value in values {
        if let Some(v) = value.value {
            if value.filter {
                continue;
            }
            if !value.message.is_empty() {
                info!("{} = {:?}", value.message, v)
            }
            return Some(v);
        }
    }
    None
}

impl Configuration {
    /// Implement precedence rules for all [`Configuration`] values: a value set on the
    /// command line wins, otherwise the [`RunOptions`] default is used.
    pub(crate) fn configure(&mut self, options: &RunOptions) {
        // Initialize the logger first so everything below can be logged.
        self.initialize_logger();

        // Configure `host`.
        self.host = get_value(vec![
            // Use --host if set.
            ConfigValue {
                value: Some(self.host.to_string()),
                filter: self.host.is_empty(),
                message: "host",
            },
            // Otherwise use RunOptions if set.
            ConfigValue {
                value: Some(options.host.to_string()),
                filter: options.host.is_empty(),
                message: "host",
            },
        ])
        .unwrap_or_default();

        // Configure `stages`.
        self.stages = get_value(vec![
            // Use --stages if set.
            ConfigValue {
                value: self.stages.clone(),
                filter: self.stages.is_none(),
                message: "stages",
            },
            // Otherwise use RunOptions.
            ConfigValue {
                value: Some(options.test_plan.clone()),
                filter: false,
                message: "",
            },
        ]);

        // Configure `graceful_stop`.
        self.graceful_stop = get_value(vec![
            // Use --graceful-stop if set.
            ConfigValue {
                value: Some(self.graceful_stop.to_string()),
                filter: self.graceful_stop.is_empty(),
                message: "graceful_stop",
            },
            // Otherwise use the default.
            ConfigValue {
                value: Some(DEFAULT_GRACEFUL_STOP.to_string()),
                filter: false,
                message: "",
            },
        ])
        .unwrap_or_default();

        // Configure `report_file`.
        self.report_file = get_value(vec![
            // Use --report-file if set.
            ConfigValue {
                value: Some(self.report_file.to_string()),
                filter: self.report_file.is_empty(),
                message: "report_file",
            },
            // Otherwise use RunOptions if set and not disabled with --no-report-file.
            ConfigValue {
                value: Some(options.report_file.to_string()),
                filter: options.report_file.is_empty() || self.no_report_file,
                message: "report_file",
            },
        ])
        .unwrap_or_default();

        // Configure `threshold`: thresholds from the command line are added to the
        // defaults, unless all thresholds are disabled.
        if self.no_thresholds {
            info!("no_thresholds = true");
            self.threshold.clear();
        } else {
            let mut thresholds = options.thresholds.clone();
            for threshold in self.threshold.drain(..) {
                info!("threshold = {}", threshold);
                thresholds.push(threshold);
            }
            self.threshold = thresholds;
        }

        // Configure `request_format`, only relevant with a request log.
        if !self.request_log.is_empty() {
            self.request_format = get_value(vec![
                // Use --request-format if set.
                ConfigValue {
                    value: self.request_format,
                    filter: self.request_format.is_none(),
                    message: "request_format",
                },
                // Otherwise default to json.
                ConfigValue {
                    value: Some(LogFormat::Json),
                    filter: false,
                    message: "",
                },
            ]);
        }
    }

    /// Validate the options set on the command line, before defaults are applied.
    pub(crate) fn validate(&self) -> Result<(), LoadTestError> {
        // Can't set both --verbose and --quiet.
        if self.verbose > 0 && self.quiet > 0 {
            return Err(LoadTestError::InvalidOption {
                option: "--verbose".to_string(),
                value: self.verbose.to_string(),
                detail: "--verbose can not be set with --quiet.".to_string(),
            });
        }

        // Can't set both --report-file and --no-report-file.
        if !self.report_file.is_empty() && self.no_report_file {
            return Err(LoadTestError::InvalidOption {
                option: "--report-file".to_string(),
                value: self.report_file.to_string(),
                detail: "--report-file can not be set with --no-report-file.".to_string(),
            });
        }

        // Can't set --request-format without --request-log.
        if let Some(format) = self.request_format.as_ref() {
            if self.request_log.is_empty() {
                return Err(LoadTestError::InvalidOption {
                    option: "--request-format".to_string(),
                    value: format.to_string(),
                    detail: "--request-format can not be set without --request-log.".to_string(),
                });
            }
        }

        // Can't set --threshold with --no-thresholds.
        if self.no_thresholds && !self.threshold.is_empty() {
            return Err(LoadTestError::InvalidOption {
                option: "--threshold".to_string(),
                value: self.threshold[0].to_string(),
                detail: "--threshold can not be set with --no-thresholds.".to_string(),
            });
        }

        // A plan from the command line must have at least one stage, and must last.
        if let Some(test_plan) = self.stages.as_ref() {
            if test_plan.stages.is_empty() {
                return Err(LoadTestError::InvalidOption {
                    option: "--stages".to_string(),
                    value: test_plan.to_string(),
                    detail: "--stages must define at least one stage.".to_string(),
                });
            }
            if test_plan.total_duration().is_zero() {
                return Err(LoadTestError::InvalidOption {
                    option: "--stages".to_string(),
                    value: test_plan.to_string(),
                    detail: "--stages must last longer than 0 seconds.".to_string(),
                });
            }
        }

        // Validate --graceful-stop.
        if !self.graceful_stop.is_empty()
            && util::parse_timespan(&self.graceful_stop) == 0
            && self.graceful_stop != "0"
        {
            return Err(LoadTestError::InvalidOption {
                option: "--graceful-stop".to_string(),
                value: self.graceful_stop.to_string(),
                detail: "--graceful-stop must be a time span, for example 30s or 1m.".to_string(),
            });
        }

        // The host must be a valid URL.
        if !self.host.is_empty() {
            util::is_valid_host(&self.host)?;
        }

        Ok(())
    }

    /// Configure the logger, writing to stdout and optionally to a log file.
    pub(crate) fn initialize_logger(&self) {
        // Configure stdout output level.
        let debug_level = match self.verbose {
            0 => match self.quiet {
                0 => LevelFilter::Info,
                1 => LevelFilter::Warn,
                _ => LevelFilter::Error,
            },
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Configure log file level.
        let log_level = match self.log_level {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        let mut loggers: Vec<Box<dyn SharedLogger>> =
            vec![SimpleLogger::new(debug_level, Config::default())];

        // Open the log file if configured.
        let log_file: Option<PathBuf> = if !self.log_file.is_empty() {
            Some(PathBuf::from(&self.log_file))
        } else {
            None
        };
        if let Some(log_to_file) = log_file.as_ref() {
            match std::fs::File::create(log_to_file) {
                Ok(file) => loggers.push(WriteLogger::new(log_level, Config::default(), file)),
                Err(e) => eprintln!("failed to create log file {}: {}", log_to_file.display(), e),
            }
        }

        if let Err(e) = CombinedLogger::init(loggers) {
            // Already initialized, for example by an earlier load test in the same process.
            debug!("failed to initialize CombinedLogger: {}", e);
        }

        if let Some(log_to_file) = log_file {
            info!("Writing to log file: {}", log_to_file.display());
        }
        info!("Output verbosity level: {}", debug_level);
        info!("Logfile verbosity level: {}", log_level);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_plan::Stage;

    fn options() -> RunOptions {
        RunOptions {
            test_plan: TestPlan::new(vec![Stage::new(60, 10)]),
            thresholds: vec![Threshold::new("http_req_failed", "rate<0.05").unwrap()],
            host: "https://www.timeapi.io".to_string(),
            report_file: "./src/output/index.html".to_string(),
        }
    }

    #[test]
    fn run_options_fill_gaps() {
        let mut config = Configuration::parse_args_default(&[] as &[&str]).unwrap();
        config.configure(&options());
        assert_eq!(config.host, "https://www.timeapi.io");
        assert_eq!(config.stages.unwrap().to_string(), "10,1m");
        assert_eq!(config.graceful_stop, DEFAULT_GRACEFUL_STOP);
        assert_eq!(config.report_file, "./src/output/index.html");
        assert_eq!(config.threshold.len(), 1);
        assert_eq!(config.request_format, None);
    }

    #[test]
    fn command_line_wins() {
        let mut config = Configuration::parse_args_default(&[
            "--host",
            "http://127.0.0.1:8080",
            "--stages",
            "2,1s;0,1s",
            "--graceful-stop",
            "5s",
            "--report-file",
            "report.html",
            "--threshold",
            "GET_Duration:p(95)<100",
            "--threshold",
            "checks:rate>0.99",
            "--request-log",
            "requests.log",
        ])
        .unwrap();
        config.validate().unwrap();
        config.configure(&options());
        assert_eq!(config.host, "http://127.0.0.1:8080");
        assert_eq!(config.stages.unwrap().to_string(), "2,1s;0,1s");
        assert_eq!(config.graceful_stop, "5s");
        assert_eq!(config.report_file, "report.html");
        let thresholds: Vec<String> = config.threshold.iter().map(|t| t.to_string()).collect();
        assert_eq!(
            thresholds,
            vec![
                "http_req_failed:rate<0.05",
                "GET_Duration:p(95)<100",
                "checks:rate>0.99"
            ]
        );
        assert_eq!(config.request_format, Some(LogFormat::Json));
    }

    #[test]
    fn disable_defaults() {
        let mut config =
            Configuration::parse_args_default(&["--no-report-file", "--no-thresholds"]).unwrap();
        config.validate().unwrap();
        config.configure(&options());
        assert!(config.report_file.is_empty());
        assert!(config.threshold.is_empty());
    }

    #[test]
    fn invalid_combinations() {
        for args in [
            vec!["-v", "-q"],
            vec!["--report-file", "report.html", "--no-report-file"],
            vec!["--request-format", "csv"],
            vec!["--no-thresholds", "--threshold", "checks:rate>0.99"],
            vec!["--graceful-stop", "soon"],
            vec!["--host", "www.timeapi.io"],
            vec!["--stages", "10,"],
            vec!["--stages", "10,0;0,0s"],
        ] {
            let config = Configuration::parse_args_default(&args).unwrap();
            assert!(config.validate().is_err(), "{:?}", args);
        }
    }

    #[test]
    fn invalid_values_are_rejected_by_the_parser() {
        assert!(Configuration::parse_args_default(&["--stages", "ten,1m"]).is_err());
        assert!(Configuration::parse_args_default(&["--threshold", "GET_Duration"]).is_err());
        assert!(Configuration::parse_args_default(&["--request-format", "xml"]).is_err());
    }
}
