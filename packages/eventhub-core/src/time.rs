//! Time utilities.
//!
//! All timestamps are Unix seconds (`i64`), both in SQLite and in the JSON
//! API. Provider payloads (Luma) carry RFC 3339 strings and are converted on
//! the way in.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Returns the current Unix timestamp in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parse an RFC 3339 timestamp (e.g. `2025-03-01T18:00:00.000Z`) into Unix seconds.
pub fn parse_rfc3339(value: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp())
        .map_err(|e| Error::validation(format!("Invalid timestamp '{}': {}", value, e)))
}

/// Format Unix seconds as RFC 3339 (UTC).
pub fn to_rfc3339(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_timestamp_is_reasonable() {
        let ts = now_timestamp();
        // Should be after 2024-01-01 (1704067200)
        assert!(ts > 1704067200, "Timestamp {} is too old", ts);
        assert!(now_timestamp_millis() > ts);
    }

    #[test]
    fn test_parse_rfc3339() {
        assert_eq!(parse_rfc3339("2024-01-01T00:00:00Z").unwrap(), 1704067200);
        assert_eq!(
            parse_rfc3339("2024-01-01T05:00:00.000+05:00").unwrap(),
            1704067200
        );
        assert!(parse_rfc3339("yesterday").is_err());
    }

    #[test]
    fn test_to_rfc3339() {
        assert_eq!(to_rfc3339(1704067200), "2024-01-01T00:00:00+00:00");
    }
}
