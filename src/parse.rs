//! Parsing helpers for human-readable configuration values
//!
//! Every parser returns `None` on malformed input so the caller decides
//! the fallback.

use std::time::Duration;

/// Parse a size string such as "10MB", "512KB", "1000000" into bytes.
///
/// Units are binary (1KB = 1024 bytes). A bare number is bytes.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim().to_uppercase();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1)
    } else {
        (s.as_str(), 1)
    };

    num_str.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}

/// Parse a duration string such as "30s", "5m", "1h", "100ms".
///
/// A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();
    let (num_str, millis) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60 * 1000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60 * 1000)
    } else {
        (s.as_str(), 1000)
    };

    let n = num_str.trim().parse::<u64>().ok()?;
    Some(Duration::from_millis(n.checked_mul(millis)?))
}

/// Parse a whole number of minutes.
pub fn parse_minutes(s: &str) -> Option<Duration> {
    let minutes = s.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(minutes.checked_mul(60)?))
}

/// Parse a boolean flag ("true"/"false", "1"/"0", "yes"/"no", "on"/"off").
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1KB"), Some(1024));
        assert_eq!(parse_size("10MB"), Some(10 * 1024 * 1024));
        assert_eq!(parse_size("1GB"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_size("512B"), Some(512));
        assert_eq!(parse_size("1000000"), Some(1_000_000));
        assert_eq!(parse_size("  5mb  "), Some(5 * 1024 * 1024));
    }

    #[test]
    fn test_parse_size_invalid() {
        assert_eq!(parse_size("lots"), None);
        assert_eq!(parse_size("-5MB"), None);
        assert_eq!(parse_size(""), None);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("100ms"), Some(Duration::from_millis(100)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("60"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn test_parse_minutes() {
        assert_eq!(parse_minutes("30"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_minutes(" 10 "), Some(Duration::from_secs(600)));
        assert_eq!(parse_minutes("10m"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
