//! Virtual users and the requests they make.
//!
//! Each virtual user is a Tokio task that runs the registered [`Iteration`] over and over
//! until the parent tells it to exit. A user owns its own
//! [`reqwest::Client`](https://docs.rs/reqwest/*/reqwest/struct.Client.html) and a
//! [`MetricsSink`] through which every request, check and iteration is reported.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

use crate::logger::{RequestLog, RequestLogEntry};
use crate::metrics::{
    MetricsSink, Sample, CHECKS, DATA_RECEIVED, HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED,
    ITERATIONS, ITERATION_DURATION, TAG_CHECK, TAG_EXPECTED_RESPONSE, TAG_METHOD, TAG_NAME,
    TAG_STATUS,
};
use crate::LoadTestError;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Commands sent from the parent to virtual users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Finish the current iteration, then exit.
    Exit,
}

/// An error that prevents an iteration from running to completion.
///
/// Unexpected statuses and transport failures are not errors: they are recorded in
/// `http_req_failed` and checks, and the iteration carries on.
#[derive(Debug)]
pub enum IterationError {
    /// A request path could not be joined to the host.
    InvalidUrl {
        path: String,
        parse_error: url::ParseError,
    },
}
impl fmt::Display for IterationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IterationError::InvalidUrl { path, parse_error } => {
                write!(f, "IterationError: invalid url {} ({})", path, parse_error)
            }
        }
    }
}
impl std::error::Error for IterationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IterationError::InvalidUrl { parse_error, .. } => Some(parse_error),
        }
    }
}

/// The result of one iteration.
pub type IterationResult = Result<(), IterationError>;

/// The body run repeatedly by every virtual user.
#[async_trait]
pub trait Iteration: Send + Sync {
    async fn run(&self, user: &mut VirtualUser) -> IterationResult;
}

/// Status codes a request considers successful, for `http_req_failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedStatuses(Vec<RangeInclusive<u16>>);
impl Default for ExpectedStatuses {
    /// Any 2xx or 3xx status.
    fn default() -> Self {
        ExpectedStatuses(vec![200..=399])
    }
}
impl ExpectedStatuses {
    /// Expect exactly one status.
    pub fn only(status: u16) -> Self {
        ExpectedStatuses(vec![status..=status])
    }

    pub fn contains(&self, status: u16) -> bool {
        self.0.iter().any(|range| range.contains(&status))
    }
}

/// Options for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    /// Groups requests in reports, defaults to the path.
    pub name: Option<String>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub expected_statuses: ExpectedStatuses,
}
impl RequestParams {
    /// A request with a `Content-Type: application/json` header.
    pub fn json() -> Self {
        RequestParams::default().with_header("Content-Type", "application/json")
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Treat `status` as the only successful response.
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_statuses = ExpectedStatuses::only(status);
        self
    }
}

/// What a request returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestResult {
    pub name: String,
    pub url: String,
    /// The response status, 0 when no response was received.
    pub status: u16,
    pub duration_ms: f64,
    pub body: String,
    /// The transport error, if the request failed.
    pub error: Option<String>,
}
impl RequestResult {
    /// Parse the response body as JSON.
    pub fn json(&self) -> ParsedBody {
        ParsedBody::parse(&self.body)
    }
}

/// The outcome of parsing a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Json(Value),
    /// No body was received.
    Empty,
    /// The body was not valid JSON, with the parse error.
    Invalid(String),
}
impl ParsedBody {
    /// # Example
    /// ```rust
    /// use timeapi_loadtest::user::ParsedBody;
    ///
    /// assert_eq!(ParsedBody::parse(""), ParsedBody::Empty);
    /// // Whitespace is a body, just not a JSON one.
    /// assert!(matches!(ParsedBody::parse(" \n"), ParsedBody::Invalid(_)));
    /// assert!(matches!(ParsedBody::parse("{\"message\":null}"), ParsedBody::Json(_)));
    /// assert!(matches!(ParsedBody::parse("<html>"), ParsedBody::Invalid(_)));
    /// ```
    pub fn parse(body: &str) -> Self {
        if body.is_empty() {
            return ParsedBody::Empty;
        }
        match serde_json::from_str(body) {
            Ok(value) => ParsedBody::Json(value),
            Err(e) => ParsedBody::Invalid(e.to_string()),
        }
    }

    /// Look up a top level field. A field set to `null` is present.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            ParsedBody::Json(Value::Object(object)) => object.get(name),
            _ => None,
        }
    }
}

/// A simulated user.
pub struct VirtualUser {
    /// Unique number of this user, starting at 1.
    pub number: usize,
    /// How many iterations this user has completed.
    pub iteration: usize,
    client: Client,
    base_url: Url,
    metrics: MetricsSink,
    logger: Option<RequestLog>,
    started: Instant,
}
impl VirtualUser {
    pub fn new(
        number: usize,
        base_url: Url,
        metrics: MetricsSink,
        logger: Option<RequestLog>,
    ) -> Result<Self, LoadTestError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .gzip(true)
            .build()?;
        Ok(VirtualUser {
            number,
            iteration: 0,
            client,
            base_url,
            metrics,
            logger,
            started: Instant::now(),
        })
    }

    /// The sink custom metrics are added through.
    pub fn metrics(&self) -> &MetricsSink {
        &self.metrics
    }

    /// Prepend the host to a path. A path that already includes a host is used as is.
    pub fn build_url(&self, path: &str) -> Result<Url, IterationError> {
        if let Ok(url) = Url::parse(path) {
            if url.host().is_some() {
                return Ok(url);
            }
        }
        self.base_url
            .join(path)
            .map_err(|parse_error| IterationError::InvalidUrl {
                path: path.to_string(),
                parse_error,
            })
    }

    /// Make a `GET` request, recording the built-in request metrics.
    ///
    /// A request that fails to complete returns status 0 rather than an error.
    pub async fn get(
        &mut self,
        path: &str,
        params: &RequestParams,
    ) -> Result<RequestResult, IterationError> {
        let url = self.build_url(path)?;
        let name = params.name.clone().unwrap_or_else(|| path.to_string());

        let mut builder = self.client.get(url.clone()).query(&params.query);
        for (key, value) in &params.headers {
            builder = builder.header(key, value);
        }

        let mut request_url = url.to_string();
        let started = Instant::now();
        let response = match builder.build() {
            Ok(request) => {
                request_url = request.url().to_string();
                self.client.execute(request).await
            }
            Err(e) => Err(e),
        };
        let (status, body, error) = match response {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(body) => (status, body, None),
                    Err(e) => {
                        warn!("{}: failed to read body: {}", &name, e);
                        (status, String::new(), Some(e.to_string()))
                    }
                }
            }
            Err(e) => {
                warn!("{}: {}", &name, e);
                (0, String::new(), Some(e.to_string()))
            }
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;
        debug!("{}: status {} in {}ms", &request_url, status, duration_ms);

        let expected = params.expected_statuses.contains(status);
        self.metrics.add(
            Sample::new(HTTP_REQS, 1.0)
                .with_tag(TAG_NAME, &name)
                .with_tag(TAG_METHOD, "GET")
                .with_tag(TAG_STATUS, &status.to_string())
                .with_tag(TAG_EXPECTED_RESPONSE, &expected.to_string()),
        );
        self.metrics
            .add(Sample::new(HTTP_REQ_DURATION, duration_ms).with_tag(TAG_NAME, &name));
        self.metrics
            .add(Sample::rate(HTTP_REQ_FAILED, !expected).with_tag(TAG_NAME, &name));
        self.metrics
            .add(Sample::new(DATA_RECEIVED, body.len() as f64));

        if let Some(logger) = self.logger.as_ref() {
            let entry = RequestLogEntry {
                elapsed: self.started.elapsed().as_millis() as u64,
                user: self.number,
                name: name.clone(),
                url: request_url.clone(),
                status,
                expected,
                duration: duration_ms,
                error: error.clone(),
            };
            if logger.send(Some(entry)).is_err() {
                debug!("request logger is no longer running");
            }
        }

        Ok(RequestResult {
            name,
            url: request_url,
            status,
            duration_ms,
            body,
            error,
        })
    }

    /// Record a named check. A failed check never stops the iteration.
    pub fn check(&self, name: &str, passed: bool) -> bool {
        if !passed {
            debug!("user {}: check failed: {}", self.number, name);
        }
        self.metrics
            .add(Sample::rate(CHECKS, passed).with_tag(TAG_CHECK, name));
        passed
    }
}

/// Run iterations until the parent says to exit.
pub(crate) async fn user_main(
    iteration: Arc<dyn Iteration>,
    mut user: VirtualUser,
    receiver: flume::Receiver<UserCommand>,
) {
    info!("launching user {}...", user.number);

    loop {
        let started = Instant::now();
        if let Err(e) = iteration.run(&mut user).await {
            error!("user {} iteration {}: {}", user.number, user.iteration, e);
        }
        user.iteration += 1;
        user.metrics.add(Sample::new(ITERATIONS, 1.0));
        user.metrics.add(Sample::new(
            ITERATION_DURATION,
            started.elapsed().as_secs_f64() * 1_000.0,
        ));

        if received_exit(&receiver) {
            break;
        }
    }

    info!(
        "exiting user {} after {} iterations...",
        user.number, user.iteration
    );
}

// Determine if the parent has sent UserCommand::Exit, or gone away.
fn received_exit(receiver: &flume::Receiver<UserCommand>) -> bool {
    match receiver.try_recv() {
        Ok(UserCommand::Exit) => true,
        Err(flume::TryRecvError::Disconnected) => true,
        Err(flume::TryRecvError::Empty) => false,
    }
}
