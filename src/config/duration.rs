//! Duration parsing for the timeout fields of `relaunch.yaml`.
//!
//! Timeouts are written as short human strings like "2s", "500ms" or "1m".

use std::time::Duration;

/// Parse a duration string like "2s", "30s", "1m", "500ms".
///
/// Supported formats:
/// - `"Nms"` - N milliseconds (e.g., "500ms")
/// - `"Ns"` - N seconds (e.g., "30s")
/// - `"Nm"` - N minutes (e.g., "5m")
/// - `"N"` - N seconds (no suffix, assumes seconds)
///
/// Returns `None` if the string cannot be parsed.
///
/// # Examples
///
/// ```
/// use relaunch::config::parse_duration_string;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration_string("2s"), Some(Duration::from_secs(2)));
/// assert_eq!(parse_duration_string("500ms"), Some(Duration::from_millis(500)));
/// assert_eq!(parse_duration_string("1m"), Some(Duration::from_secs(60)));
/// assert_eq!(parse_duration_string("30"), Some(Duration::from_secs(30)));
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return None;
    }

    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Resolve an optional duration field, falling back to `default` when the
/// field is absent or unparseable. Unparseable values are logged.
pub fn duration_or(field: &str, value: Option<&str>, default: Duration) -> Duration {
    match value {
        None => default,
        Some(raw) => parse_duration_string(raw).unwrap_or_else(|| {
            tracing::warn!(
                "Invalid duration '{}' for '{}', using default {:?}",
                raw,
                field,
                default
            );
            default
        }),
    }
}
