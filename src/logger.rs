//! Optional request log.
//!
//! The request log is enabled with the `--request-log` command-line option. When enabled, a
//! dedicated task is launched and a channel is provided to every
//! [`VirtualUser`](../user/struct.VirtualUser.html), which sends one [`RequestLogEntry`]
//! per request made. The logger task writes entries through Tokio's asynchronous
//! [`BufWriter`](https://docs.rs/tokio/*/tokio/io/struct.BufWriter.html) so that users
//! never wait on the disk.
//!
//! The format of the log is selected with `--request-format`:
//!  - `json`: one JSON object per line (the default).
//!  - `csv`: comma separated values, with a header line.
//!  - `raw`: the Rust debug representation of each entry.
//!  - `pretty`: the pretty-printed Rust debug representation of each entry.

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::LoadTestError;

/// The channel users send request log entries through. `None` tells the logger to exit.
pub type RequestLog = flume::Sender<Option<RequestLogEntry>>;

/// Supported request log formats.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, EnumIter, strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Csv,
    Raw,
    Pretty,
}
impl FromStr for LogFormat {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let formats = RegexSet::new([
            r"(?i)^(json|jsn)$",
            r"(?i)^(csv)$",
            r"(?i)^(raw)$",
            r"(?i)^(pretty|pretty-print)$",
        ])
        .expect("failed to compile log format RegexSet");
        let matches = formats.matches(s);
        if matches.matched(0) {
            Ok(LogFormat::Json)
        } else if matches.matched(1) {
            Ok(LogFormat::Csv)
        } else if matches.matched(2) {
            Ok(LogFormat::Raw)
        } else if matches.matched(3) {
            Ok(LogFormat::Pretty)
        } else {
            Err(LoadTestError::InvalidOption {
                option: "--request-format".to_string(),
                value: s.to_string(),
                detail: format!(
                    "Invalid format, expected one of: {}",
                    LogFormat::iter()
                        .map(|format| format.to_string())
                        .collect::<Vec<String>>()
                        .join(", ")
                ),
            })
        }
    }
}

/// One request, as written to the request log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    /// Milliseconds since the user started.
    pub elapsed: u64,
    /// The user that made the request.
    pub user: usize,
    /// The request name, used to group requests in reports.
    pub name: String,
    pub url: String,
    /// The response status, 0 if no response was received.
    pub status: u16,
    /// Whether the status was one the request expected.
    pub expected: bool,
    /// How long the request took, in milliseconds.
    pub duration: f64,
    /// The transport error, if any.
    pub error: Option<String>,
}
impl RequestLogEntry {
    pub const CSV_HEADER: &'static str = "elapsed,user,name,url,status,expected,duration,error";

    fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.elapsed,
            self.user,
            csv_escape(&self.name),
            csv_escape(&self.url),
            self.status,
            self.expected,
            self.duration,
            csv_escape(self.error.as_deref().unwrap_or("")),
        )
    }

    /// Render the entry in the requested format.
    pub fn format(&self, format: LogFormat) -> String {
        match format {
            LogFormat::Json => serde_json::json!(self).to_string(),
            LogFormat::Csv => self.to_csv(),
            LogFormat::Raw => format!("{:?}", self),
            LogFormat::Pretty => format!("{:#?}", self),
        }
    }
}

// Quote a csv field if it contains a delimiter, a quote or a line break.
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Create (or truncate) the request log, before any user is launched.
pub(crate) async fn open_request_log(path: &str) -> Result<File, LoadTestError> {
    match File::create(path).await {
        Ok(file) => Ok(file),
        Err(e) => {
            error!("failed to create request log {}: {}", path, e);
            Err(e.into())
        }
    }
}

/// Logger task, writes every entry received from users to the opened request log.
///
/// Exits when a `None` message is received or every sender has been dropped, flushing
/// the log to disk.
pub(crate) async fn logger_main(
    file: File,
    path: String,
    format: LogFormat,
    receiver: flume::Receiver<Option<RequestLogEntry>>,
) -> Result<(), LoadTestError> {
    info!("writing requests to request log: {}", &path);
    let mut writer = BufWriter::with_capacity(64 * 1024, file);

    if format == LogFormat::Csv {
        writer
            .write_all(format!("{}\n", RequestLogEntry::CSV_HEADER).as_bytes())
            .await?;
    }

    while let Ok(Some(entry)) = receiver.recv_async().await {
        if let Err(e) = writer
            .write_all(format!("{}\n", entry.format(format)).as_bytes())
            .await
        {
            warn!("failed to write to {}: {}", &path, e);
        }
    }

    info!("flushing request log: {}", &path);
    writer.flush().await?;
    Ok(())
}
