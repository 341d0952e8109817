//! Utility functions shared by the load test runtime and reports.

use num_format::{Locale, ToFormattedString};
use regex::Regex;
use std::str::FromStr;
use std::time;
use url::Url;

use crate::{LoadTestError, CANCELED};

lazy_static! {
    static ref TIMESPAN: Regex =
        Regex::new(r"((?P<hours>\d+?)h)?((?P<minutes>\d+?)m)?((?P<seconds>\d+?)s)?")
            .expect("failed to compile timespan regex");
}

/// Parse a string representing a time span and return the number of seconds.
///
/// Can be specified as an integer, indicating seconds. Or can use integers
/// together with one or more of "h", "m", and "s", in that order, indicating
/// "hours", "minutes", and "seconds".
///
/// Valid formats include: 20, 20s, 3m, 2h, 1h20m, 3h30m10s, etc.
///
/// # Example
/// ```rust
/// use timeapi_loadtest::util;
///
/// // The first ramp stage of the time api test lasts one minute.
/// assert_eq!(util::parse_timespan("60s"), 60);
///
/// // 1 hour 2 minutes and 3 seconds is 3,723 seconds.
/// assert_eq!(util::parse_timespan("1h2m3s"), 3_723);
///
/// // Invalid value is 0 seconds.
/// assert_eq!(util::parse_timespan("foo"), 0);
/// ```
pub fn parse_timespan(time_str: &str) -> usize {
    if let Ok(seconds) = usize::from_str(time_str) {
        trace!("{} is integer: {} seconds", time_str, seconds);
        return seconds;
    }

    let captures = match TIMESPAN.captures(time_str) {
        Some(captures) => captures,
        None => return 0,
    };
    let component = |name: &str| -> usize {
        captures
            .name(name)
            .and_then(|value| usize::from_str(value.as_str()).ok())
            .unwrap_or(0)
    };
    let (hours, minutes, seconds) = (
        component("hours"),
        component("minutes"),
        component("seconds"),
    );
    let total = hours * 60 * 60 + minutes * 60 + seconds;
    trace!(
        "{} hours {} minutes {} seconds: {} seconds",
        hours,
        minutes,
        seconds,
        total
    );
    total
}

/// Render a number of seconds back into the shortest `h`/`m`/`s` time span.
///
/// # Example
/// ```rust
/// use timeapi_loadtest::util;
///
/// assert_eq!(util::format_timespan(120), "2m");
/// assert_eq!(util::format_timespan(3_723), "1h2m3s");
/// assert_eq!(util::format_timespan(0), "0s");
/// ```
pub fn format_timespan(seconds: usize) -> String {
    if seconds == 0 {
        return "0s".to_string();
    }
    let hours = seconds / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let seconds = seconds % 60;

    let mut timespan = String::new();
    if hours > 0 {
        timespan.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        timespan.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        timespan.push_str(&format!("{}s", seconds));
    }
    timespan
}

/// Sleep for a specified duration, minus the time spent doing other things.
///
/// Returns a fresh drift timer to be passed in on the next call, so that a loop waking
/// regularly does not slowly drift by the time spent between sleeps.
pub async fn sleep_minus_drift(
    duration: time::Duration,
    drift: tokio::time::Instant,
) -> tokio::time::Instant {
    match duration.checked_sub(drift.elapsed()) {
        Some(delay) if delay.as_nanos() > 0 => tokio::time::sleep(delay).await,
        _ => debug!("sleep_minus_drift: drift was greater than or equal to duration, not sleeping"),
    };
    tokio::time::Instant::now()
}

/// Truncate strings when they're too long to display.
///
/// If a string is longer than the specified max length, this function removes extra
/// the characters and replaces the last two with a double-period ellipsis.
///
/// # Example
/// ```rust
/// use timeapi_loadtest::util;
///
/// assert_eq!(util::truncate_string("GET Time (Zone) - Status 200", 12), "GET Time (..");
/// assert_eq!(util::truncate_string("checks", 15), "checks");
/// ```
pub fn truncate_string(str_to_truncate: &str, max_length: usize) -> String {
    if str_to_truncate.char_indices().count() > max_length {
        match str_to_truncate.char_indices().nth(max_length.saturating_sub(2)) {
            None => str_to_truncate.to_string(),
            Some((idx, _)) => format!("{}..", &str_to_truncate[..idx]),
        }
    } else {
        str_to_truncate.to_string()
    }
}

/// Format an integer with thousands separators.
pub fn format_number(number: usize) -> String {
    number.to_formatted_string(&Locale::en)
}

/// Format a duration in milliseconds the way the summaries display time values.
///
/// # Example
/// ```rust
/// use timeapi_loadtest::util;
///
/// assert_eq!(util::format_duration(0.5), "500µs");
/// assert_eq!(util::format_duration(182.456), "182.46ms");
/// assert_eq!(util::format_duration(5_700.0), "5.7s");
/// assert_eq!(util::format_duration(90_000.0), "1m30s");
/// ```
pub fn format_duration(milliseconds: f64) -> String {
    if milliseconds < 1.0 {
        format!("{}µs", (milliseconds * 1_000.0).round())
    } else if milliseconds < 1_000.0 {
        format!("{}ms", round_to(milliseconds, 2))
    } else if milliseconds < 60_000.0 {
        format!("{}s", round_to(milliseconds / 1_000.0, 2))
    } else {
        let seconds = (milliseconds / 1_000.0).round() as usize;
        format_timespan(seconds)
    }
}

/// Round a float to a fixed number of decimals, dropping trailing zeros when displayed.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Helper function to determine if a host can be parsed.
///
/// # Example
/// ```rust
/// use timeapi_loadtest::util;
///
/// assert!(util::is_valid_host("https://www.timeapi.io").is_ok());
/// assert!(util::is_valid_host("www.timeapi.io").is_err());
/// ```
pub fn is_valid_host(host: &str) -> Result<bool, LoadTestError> {
    Url::parse(host).map_err(|parse_error| LoadTestError::InvalidHost {
        host: host.to_string(),
        detail: "Invalid host.".to_string(),
        parse_error,
    })?;
    Ok(true)
}

// Internal helper to configure the control-c handler. Shutdown cleanly on the first
// ctrl-c. Exit abruptly on the second ctrl-c.
pub(crate) fn setup_ctrlc_handler() {
    match ctrlc::set_handler(move || {
        let already_canceled = CANCELED.read().map(|canceled| *canceled).unwrap_or(true);
        if already_canceled {
            warn!("caught another ctrl-c, exiting immediately...");
            std::process::exit(1);
        } else {
            warn!("caught ctrl-c, stopping...");
            if let Ok(mut canceled) = CANCELED.write() {
                *canceled = true;
            }
        }
    }) {
        Ok(_) => (),
        Err(e) => {
            // The handler can only be registered once per process, which happens when
            // several load tests run from the same test binary: reset the flag instead.
            if let Ok(mut canceled) = CANCELED.write() {
                *canceled = false;
            }
            info!("reset ctrl-c handler: {}", e);
        }
    }
}

/// Returns true once ctrl-c has been caught.
pub(crate) fn canceled() -> bool {
    CANCELED.read().map(|canceled| *canceled).unwrap_or(false)
}
