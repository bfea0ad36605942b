//! Time utility functions

use chrono::{DateTime, TimeZone, Utc};

const NANOS_PER_SEC: u64 = 1_000_000_000;
const NANOS_PER_DAY: u64 = 86_400 * NANOS_PER_SEC;

/// Current wall-clock time as nanoseconds since Unix epoch
pub fn now_unix_nanos() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

/// Length of `days` in nanoseconds
pub fn days_to_nanos(days: u32) -> u64 {
    u64::from(days).saturating_mul(NANOS_PER_DAY)
}

/// Convert nanoseconds since Unix epoch to DateTime<Utc>
pub fn nanos_to_datetime(nanos: u64) -> DateTime<Utc> {
    let secs = (nanos / NANOS_PER_SEC) as i64;
    let nsecs = (nanos % NANOS_PER_SEC) as u32;
    Utc.timestamp_opt(secs, nsecs).single().unwrap_or_else(|| {
        tracing::warn!(nanos, "Invalid timestamp, using epoch");
        DateTime::UNIX_EPOCH
    })
}

/// Parse a time bound given either as integer epoch nanoseconds or RFC 3339
pub fn parse_time_bound(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(nanos) = value.parse::<u64>() {
        return Some(nanos);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .and_then(|dt| dt.timestamp_nanos_opt())
        .and_then(|n| u64::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_days_to_nanos() {
        assert_eq!(days_to_nanos(0), 0);
        assert_eq!(days_to_nanos(1), 86_400_000_000_000);
        assert_eq!(days_to_nanos(u32::MAX), u64::from(u32::MAX) * NANOS_PER_DAY);
    }

    #[test]
    fn test_now_is_after_2024() {
        assert!(now_unix_nanos() > 1_704_067_200 * NANOS_PER_SEC);
    }

    #[test]
    fn test_nanos_to_datetime_known_value() {
        let dt = nanos_to_datetime(1_704_067_200 * NANOS_PER_SEC);
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 1));
    }

    #[test]
    fn test_parse_time_bound() {
        assert_eq!(parse_time_bound("1000"), Some(1000));
        assert_eq!(
            parse_time_bound("2024-01-01T00:00:00Z"),
            Some(1_704_067_200 * NANOS_PER_SEC)
        );
        assert_eq!(parse_time_bound("yesterday"), None);
        assert_eq!(parse_time_bound("-5"), None);
    }
}
