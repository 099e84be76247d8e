//! Time-related utilities

use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Filename stamp format of nfcapd capture files (`nfcapd.202301010000`).
pub const CAPTURE_STAMP_FORMAT: &str = "%Y%m%d%H%M";

/// Get the current system time in milliseconds since UNIX epoch
pub fn system_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Parse a capture-file stamp (`YYYYMMDDhhmm`) as a UTC instant.
pub fn parse_capture_stamp(stamp: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(stamp, CAPTURE_STAMP_FORMAT).map(|t| t.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time() {
        let millis = system_time_millis();
        assert!(millis > 1_600_000_000_000); // After 2020
    }

    #[test]
    fn test_parse_capture_stamp() {
        let t = parse_capture_stamp("202301010000").unwrap();
        assert_eq!(t.timestamp_millis(), 1_672_531_200_000);

        let t = parse_capture_stamp("202212312355").unwrap();
        assert_eq!(t.to_rfc3339(), "2022-12-31T23:55:00+00:00");
    }

    #[test]
    fn test_parse_capture_stamp_rejects_garbage() {
        assert!(parse_capture_stamp("current.1234").is_err());
        assert!(parse_capture_stamp("2023010100").is_err());
        assert!(parse_capture_stamp("202313010000").is_err());
    }
}
