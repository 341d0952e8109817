//! # timeapi-loadtest
//!
//! A load test of the [timeapi.io](https://www.timeapi.io) time lookup API.
//!
//! Virtual users repeatedly look up the current time by zone, by coordinate and from the
//! system clock, and request an endpoint that does not exist. The number of concurrent
//! users ramps through a series of stages. Request durations and statuses are recorded in
//! metrics, checked against thresholds when the load test ends, and summarized in an html
//! report and a text summary.
//!
//! ## Running the load test
//!
//! ```bash
//! $ cargo run --release
//! ```
//!
//! By default the load test ramps to 10 users over one minute, to 160 users over the next
//! minute, and to 300 users over the following two minutes. The ramp, host, thresholds and
//! reports can all be changed at run time, see `--help`:
//!
//! ```bash
//! $ cargo run --release -- --host http://127.0.0.1:8080 --stages "5,10s;0,5s" -v
//! ```
//!
//! The process exits with status 99 if any threshold failed.
//!
//! ## Writing a load test
//!
//! A load test declares its custom metrics, its [`RunOptions`](./options/struct.RunOptions.html)
//! and the [`Iteration`](./user/trait.Iteration.html) every virtual user runs:
//!
//! ```rust,no_run
//! use timeapi_loadtest::prelude::*;
//!
//! struct Ping {
//!     duration: Trend,
//! }
//!
//! #[async_trait]
//! impl Iteration for Ping {
//!     async fn run(&self, user: &mut VirtualUser) -> IterationResult {
//!         let result = user.get("/api/Time/current/system", &RequestParams::json()).await?;
//!         self.duration.add(user.metrics(), result.duration_ms);
//!         user.check("status is 200", result.status == 200);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LoadTestError> {
//!     let mut load_test = LoadTest::initialize()?;
//!     let duration = load_test.declare_trend("ping", true)?;
//!     load_test
//!         .set_options(RunOptions {
//!             test_plan: TestPlan::new(vec![Stage::new(30, 5)]),
//!             thresholds: vec![Threshold::new("ping", "p(95)<500")?],
//!             host: "https://www.timeapi.io".to_string(),
//!             report_file: String::new(),
//!         })
//!         .register_iteration(Ping { duration })
//!         .execute()
//!         .await?;
//!     Ok(())
//! }
//! ```

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod config;
pub mod logger;
pub mod metrics;
pub mod options;
pub mod prelude;
pub mod report;
pub mod scenario;
pub mod test_plan;
pub mod threshold;
pub mod user;
pub mod util;

use chrono::prelude::*;
use gumdrop::Options;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use std::{fmt, io};
use tokio::task::JoinHandle;
use url::Url;

use crate::config::Configuration;
use crate::logger::{LogFormat, RequestLog};
use crate::metrics::{
    builtin_metrics, LoadTestMetrics, MetricDefinition, MetricKind, MetricsSink, Rate, Trend,
};
use crate::options::RunOptions;
use crate::report::SummaryOptions;
use crate::test_plan::{StageAction, StageHistory, TestPlan};
use crate::threshold::Threshold;
use crate::user::{Iteration, UserCommand, VirtualUser};

// Set to true once ctrl-c has been caught.
lazy_static! {
    static ref CANCELED: RwLock<bool> = RwLock::new(false);
}

/// How often the parent wakes to adjust the number of running users.
const TICK: Duration = Duration::from_millis(100);

/// An enumeration of all errors a [`LoadTest`] can return.
#[derive(Debug)]
pub enum LoadTestError {
    /// Wraps a [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    Io(io::Error),
    /// Wraps a [`reqwest::Error`](https://docs.rs/reqwest/*/reqwest/struct.Error.html).
    Reqwest(reqwest::Error),
    /// Wraps a ['tokio::task::JoinError'](https://docs.rs/tokio/*/tokio/task/struct.JoinError.html).
    TokioJoin(tokio::task::JoinError),
    /// Failed to parse a hostname.
    InvalidHost {
        /// The invalid hostname that caused this error.
        host: String,
        /// An optional explanation of the error.
        detail: String,
        /// Wraps a [`url::ParseError`](https://docs.rs/url/*/url/enum.ParseError.html).
        parse_error: url::ParseError,
    },
    /// Invalid option or value specified, may only be invalid in context.
    InvalidOption {
        /// The invalid option that caused this error, may be only invalid in context.
        option: String,
        /// The invalid value that caused this error, may be only invalid in context.
        value: String,
        /// An optional explanation of the error.
        detail: String,
    },
    /// A threshold could not be parsed, or does not fit the metric it names.
    InvalidThreshold {
        /// The threshold that caused this error.
        threshold: String,
        /// An optional explanation of the error.
        detail: String,
    },
    /// No [`Iteration`](./user/trait.Iteration.html) was registered.
    NoIteration {
        /// An optional explanation of the error.
        detail: String,
    },
}
/// Implement a helper to provide a text description of all possible types of errors.
impl LoadTestError {
    fn describe(&self) -> &str {
        match *self {
            LoadTestError::Io(_) => "io::Error",
            LoadTestError::Reqwest(_) => "reqwest::Error",
            LoadTestError::TokioJoin(_) => "tokio::task::JoinError",
            LoadTestError::InvalidHost { .. } => "failed to parse hostname",
            LoadTestError::InvalidOption { .. } => "invalid option or value specified",
            LoadTestError::InvalidThreshold { .. } => "invalid threshold specified",
            LoadTestError::NoIteration { .. } => "no iteration defined",
        }
    }
}

/// Implement format trait to allow displaying errors.
impl fmt::Display for LoadTestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LoadTestError::Io(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::Reqwest(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::TokioJoin(ref source) => {
                write!(f, "LoadTestError: {} ({})", self.describe(), source)
            }
            LoadTestError::InvalidHost {
                ref host,
                ref parse_error,
                ..
            } => write!(
                f,
                "LoadTestError: {} {} ({})",
                self.describe(),
                host,
                parse_error
            ),
            LoadTestError::InvalidOption {
                ref option,
                ref value,
                ref detail,
            } => write!(
                f,
                "LoadTestError: {} {}={:?}: {}",
                self.describe(),
                option,
                value,
                detail
            ),
            LoadTestError::InvalidThreshold {
                ref threshold,
                ref detail,
            } => write!(
                f,
                "LoadTestError: {} {:?}: {}",
                self.describe(),
                threshold,
                detail
            ),
            LoadTestError::NoIteration { ref detail } => {
                write!(f, "LoadTestError: {}: {}", self.describe(), detail)
            }
        }
    }
}

// Define the lower level source of this error, if any.
impl std::error::Error for LoadTestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            LoadTestError::Io(ref source) => Some(source),
            LoadTestError::Reqwest(ref source) => Some(source),
            LoadTestError::TokioJoin(ref source) => Some(source),
            LoadTestError::InvalidHost {
                ref parse_error, ..
            } => Some(parse_error),
            _ => None,
        }
    }
}

/// Auto-convert Reqwest errors.
impl From<reqwest::Error> for LoadTestError {
    fn from(err: reqwest::Error) -> LoadTestError {
        LoadTestError::Reqwest(err)
    }
}

/// Auto-convert IO errors.
impl From<io::Error> for LoadTestError {
    fn from(err: io::Error) -> LoadTestError {
        LoadTestError::Io(err)
    }
}

/// Auto-convert TokioJoin errors.
impl From<tokio::task::JoinError> for LoadTestError {
    fn from(err: tokio::task::JoinError) -> LoadTestError {
        LoadTestError::TokioJoin(err)
    }
}

/// The phases of a load test, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum RunPhase {
    /// Configuration is being prepared, no users are running.
    Idle,
    /// Users are being started and retired to follow the test plan.
    Running,
    /// The test plan completed or was canceled, users are finishing their iteration.
    Stopping,
    /// All users stopped, summaries are being produced.
    Shutdown,
}

// A running user, as tracked by the parent.
struct RunningUser {
    number: usize,
    sender: flume::Sender<UserCommand>,
    handle: JoinHandle<()>,
}

// Everything resolved from configuration that the run loop needs.
struct RunSettings {
    host: Url,
    test_plan: TestPlan,
    thresholds: Vec<Threshold>,
    graceful_stop: Duration,
}

/// A load test: custom metrics, run options and the iteration every user runs.
pub struct LoadTest {
    configuration: Configuration,
    options: RunOptions,
    definitions: BTreeMap<String, MetricDefinition>,
    iteration: Option<Arc<dyn Iteration>>,
    phase: RunPhase,
}
impl LoadTest {
    /// Load configuration from the command line and initialize a [`LoadTest`].
    pub fn initialize() -> Result<LoadTest, LoadTestError> {
        LoadTest::initialize_with_config(Configuration::parse_args_default_or_exit())
    }

    /// Initialize a [`LoadTest`] with an already loaded configuration.
    ///
    /// This is generally used by tests.
    ///
    /// # Example
    /// ```rust
    /// use timeapi_loadtest::config::Configuration;
    /// use timeapi_loadtest::LoadTest;
    /// use gumdrop::Options;
    ///
    /// let configuration = Configuration::parse_args_default(&["--host", "http://127.0.0.1"]).unwrap();
    /// let load_test = LoadTest::initialize_with_config(configuration);
    /// assert!(load_test.is_ok());
    /// ```
    pub fn initialize_with_config(configuration: Configuration) -> Result<LoadTest, LoadTestError> {
        let definitions = builtin_metrics()
            .into_iter()
            .map(|definition| (definition.name.clone(), definition))
            .collect();
        Ok(LoadTest {
            configuration,
            options: RunOptions::default(),
            definitions,
            iteration: None,
            phase: RunPhase::Idle,
        })
    }

    /// Set the defaults used for anything not configured on the command line.
    pub fn set_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Register the iteration every virtual user runs.
    pub fn register_iteration(mut self, iteration: impl Iteration + 'static) -> Self {
        self.iteration = Some(Arc::new(iteration));
        self
    }

    fn declare(&mut self, name: &str, kind: MetricKind, is_time: bool) -> Result<(), LoadTestError> {
        if self.definitions.contains_key(name) {
            return Err(LoadTestError::InvalidOption {
                option: "metric".to_string(),
                value: name.to_string(),
                detail: "a metric with this name was already declared".to_string(),
            });
        }
        self.definitions
            .insert(name.to_string(), MetricDefinition::new(name, kind, is_time));
        Ok(())
    }

    /// Declare a custom trend metric. Set `is_time` if values are milliseconds.
    pub fn declare_trend(&mut self, name: &str, is_time: bool) -> Result<Trend, LoadTestError> {
        self.declare(name, MetricKind::Trend, is_time)?;
        Ok(Trend::new(name))
    }

    /// Declare a custom rate metric.
    pub fn declare_rate(&mut self, name: &str) -> Result<Rate, LoadTestError> {
        self.declare(name, MetricKind::Rate, false)?;
        Ok(Rate::new(name))
    }

    fn set_phase(&mut self, phase: RunPhase) {
        info!("{} -> {}", self.phase, phase);
        self.phase = phase;
    }

    // Resolve and validate everything the run loop needs.
    fn prepare(&self) -> Result<RunSettings, LoadTestError> {
        let test_plan = self.configuration.stages.clone().unwrap_or_default();
        if test_plan.stages.is_empty() {
            return Err(LoadTestError::InvalidOption {
                option: "--stages".to_string(),
                value: test_plan.to_string(),
                detail: "the test plan must define at least one stage.".to_string(),
            });
        }
        if test_plan.total_duration().is_zero() {
            return Err(LoadTestError::InvalidOption {
                option: "--stages".to_string(),
                value: test_plan.to_string(),
                detail: "the test plan must last longer than 0 seconds.".to_string(),
            });
        }

        if self.configuration.host.is_empty() {
            return Err(LoadTestError::InvalidOption {
                option: "--host".to_string(),
                value: String::new(),
                detail: "a host must be defined with --host or RunOptions.".to_string(),
            });
        }
        let host =
            Url::parse(&self.configuration.host).map_err(|parse_error| LoadTestError::InvalidHost {
                host: self.configuration.host.to_string(),
                detail: "Invalid host.".to_string(),
                parse_error,
            })?;

        for threshold in &self.configuration.threshold {
            threshold.validate(&self.definitions)?;
        }

        Ok(RunSettings {
            host,
            test_plan,
            thresholds: self.configuration.threshold.clone(),
            graceful_stop: Duration::from_secs(
                util::parse_timespan(&self.configuration.graceful_stop) as u64,
            ),
        })
    }

    // Print the resolved plan, thresholds and metrics for --list.
    fn print_info(&self, settings: &RunSettings) {
        println!("Host: {}", settings.host);
        println!("Stages:");
        for (index, stage) in settings.test_plan.stages.iter().enumerate() {
            println!(
                " {}: {} users over {}",
                index + 1,
                stage.target,
                util::format_timespan(stage.duration.as_secs() as usize)
            );
        }
        println!("Thresholds:");
        for threshold in &settings.thresholds {
            println!(" {}", threshold);
        }
        println!("Metrics:");
        for definition in self.definitions.values() {
            println!(" {} ({})", definition.name, definition.kind);
        }
    }

    // Launch the request logger task if a request log was configured. The log is created
    // here so an unwritable path fails before any user is launched.
    async fn setup_request_logger(
        &self,
    ) -> Result<Option<(JoinHandle<Result<(), LoadTestError>>, RequestLog)>, LoadTestError> {
        if self.configuration.request_log.is_empty() {
            return Ok(None);
        }
        let file = logger::open_request_log(&self.configuration.request_log).await?;
        let (sender, receiver) = flume::unbounded();
        let handle = tokio::spawn(logger::logger_main(
            file,
            self.configuration.request_log.to_string(),
            self.configuration.request_format.unwrap_or(LogFormat::Json),
            receiver,
        ));
        Ok(Some((handle, sender)))
    }

    /// Execute the load test, returning the final metrics.
    ///
    /// Thresholds have been evaluated and summaries produced by the time this returns. Use
    /// [`LoadTestMetrics::thresholds_passed`](./metrics/struct.LoadTestMetrics.html#method.thresholds_passed)
    /// to determine the outcome.
    pub async fn execute(mut self) -> Result<LoadTestMetrics, LoadTestError> {
        if self.configuration.version {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            return Ok(LoadTestMetrics::default());
        }

        self.configuration.validate()?;
        let options = self.options.clone();
        self.configuration.configure(&options);
        let settings = self.prepare()?;

        if self.configuration.list {
            self.print_info(&settings);
            return Ok(LoadTestMetrics::default());
        }

        let iteration = self
            .iteration
            .clone()
            .ok_or_else(|| LoadTestError::NoIteration {
                detail: "No iteration is defined, register one with register_iteration.".to_string(),
            })?;

        util::setup_ctrlc_handler();

        let mut metrics = self.run(iteration, &settings).await?;

        metrics.evaluate_thresholds(&settings.thresholds);
        if metrics.thresholds_passed() {
            info!("all thresholds passed");
        } else {
            warn!("some thresholds have failed");
        }

        report::handle_summary(&metrics, &SummaryOptions::from_configuration(&self.configuration))
            .await?;
        self.set_phase(RunPhase::Idle);

        Ok(metrics)
    }

    // Start and retire users to follow the test plan, then stop them all.
    async fn run(
        &mut self,
        iteration: Arc<dyn Iteration>,
        settings: &RunSettings,
    ) -> Result<LoadTestMetrics, LoadTestError> {
        let definitions: Vec<MetricDefinition> = self.definitions.values().cloned().collect();
        let mut metrics =
            LoadTestMetrics::initialize(settings.host.as_str(), &settings.test_plan, &definitions);
        let (sink, receiver) = MetricsSink::channel();
        let request_logger = self.setup_request_logger().await?;

        let mut users: Vec<RunningUser> = Vec::new();
        let mut retired: Vec<RunningUser> = Vec::new();
        let mut next_user = 1;
        let mut current_stage = None;

        let started = Instant::now();
        metrics.started = Some(Local::now());
        self.set_phase(RunPhase::Running);

        let mut drift_timer = tokio::time::Instant::now();
        loop {
            let elapsed = started.elapsed();
            if util::canceled() {
                info!("load test canceled");
                break;
            }
            let stage = match settings.test_plan.stage_at(elapsed) {
                Some(stage) => stage,
                None => break,
            };

            if current_stage != Some(stage) {
                let action = settings.test_plan.stage_action(stage);
                info!(
                    "stage {} of {}: {} toward {} users over {}",
                    stage + 1,
                    settings.test_plan.stages.len(),
                    action,
                    settings.test_plan.stages[stage].target,
                    util::format_timespan(settings.test_plan.stages[stage].duration.as_secs() as usize)
                );
                metrics
                    .history
                    .push(StageHistory::step(stage, action, users.len()));
                current_stage = Some(stage);
            }

            // Launch users until the target is reached.
            let target = settings.test_plan.target_at(elapsed);
            while users.len() < target {
                let (sender, user_receiver) = flume::unbounded();
                let user = VirtualUser::new(
                    next_user,
                    settings.host.clone(),
                    sink.clone(),
                    request_logger.as_ref().map(|(_, logger)| logger.clone()),
                )?;
                let handle = tokio::spawn(user::user_main(iteration.clone(), user, user_receiver));
                users.push(RunningUser {
                    number: next_user,
                    sender,
                    handle,
                });
                next_user += 1;
            }

            // Retire the most recently launched users first.
            while users.len() > target {
                if let Some(user) = users.pop() {
                    debug!("retiring user {}", user.number);
                    let _ = user.sender.send(UserCommand::Exit);
                    retired.push(user);
                }
            }

            metrics.record_vus(users.len());
            for sample in receiver.try_iter() {
                metrics.record(sample);
            }

            drift_timer = util::sleep_minus_drift(TICK, drift_timer).await;
        }

        self.set_phase(RunPhase::Stopping);
        metrics.history.push(StageHistory::step(
            settings.test_plan.stages.len(),
            StageAction::Finished,
            users.len(),
        ));
        for user in &users {
            let _ = user.sender.send(UserCommand::Exit);
        }
        let handles: Vec<JoinHandle<()>> = users
            .into_iter()
            .chain(retired)
            .map(|user| user.handle)
            .collect();
        let abort_handles: Vec<_> = handles.iter().map(|handle| handle.abort_handle()).collect();
        info!(
            "waiting up to {} for {} users to finish their iteration...",
            util::format_timespan(settings.graceful_stop.as_secs() as usize),
            handles.len()
        );
        match tokio::time::timeout(settings.graceful_stop, futures::future::join_all(handles)).await
        {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!("user task failed: {}", e);
                    }
                }
            }
            Err(_) => {
                warn!("users still running after the graceful stop, aborting them");
                for abort_handle in abort_handles {
                    abort_handle.abort();
                }
            }
        }

        self.set_phase(RunPhase::Shutdown);
        drop(sink);
        for sample in receiver.drain() {
            metrics.record(sample);
        }
        metrics.stopped = Some(Local::now());
        metrics.duration = started.elapsed().as_secs_f64();

        if let Some((handle, logger)) = request_logger {
            let _ = logger.send(None);
            handle.await??;
        }

        Ok(metrics)
    }
}
