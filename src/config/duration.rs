//! Duration parsing utilities.
//!
//! Environment variables and CLI flags accept human-readable durations
//! like "5s", "1.5s", "250ms", "2m" or a bare number of seconds.

use std::time::Duration;
use tokio::time::Instant;

/// Thirty years; later than any deadline a container will live to see.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Parse a duration string like "10s", "1.5s", "1m", "500ms", "1h".
///
/// Supported formats:
/// - `"Nms"` - N milliseconds (e.g., "500ms")
/// - `"Ns"` - N seconds, fractions allowed (e.g., "30s", "0.5s")
/// - `"Nm"` - N minutes (e.g., "5m")
/// - `"Nh"` - N hours (e.g., "1h")
/// - `"N"` - N seconds (no suffix, fractions allowed)
///
/// Returns `None` if the string cannot be parsed or is negative.
///
/// # Examples
///
/// ```
/// use entrygate::config::parse_duration_string;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration_string("5s"), Some(Duration::from_secs(5)));
/// assert_eq!(parse_duration_string("500ms"), Some(Duration::from_millis(500)));
/// assert_eq!(parse_duration_string("1m"), Some(Duration::from_secs(60)));
/// assert_eq!(parse_duration_string("0.25"), Some(Duration::from_millis(250)));
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return None;
    }

    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        parse_seconds(secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        parse_seconds(s)
    }
}

/// Whole or fractional seconds. Signs are rejected so "-5" and "+5" both fail.
fn parse_seconds(s: &str) -> Option<Duration> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    if let Ok(whole) = s.parse::<u64>() {
        return Some(Duration::from_secs(whole));
    }
    s.parse::<f64>()
        .ok()
        .and_then(|f| Duration::try_from_secs_f64(f).ok())
}

/// `start + span`, saturating at a far-future instant instead of
/// overflowing. Any accepted duration, however large, yields a deadline.
pub fn deadline_after(start: Instant, span: Duration) -> Instant {
    start
        .checked_add(span.min(FAR_FUTURE))
        .unwrap_or(start)
}
