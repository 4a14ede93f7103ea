//! Clock helpers used by multiple services.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Current timestamp in milliseconds since the Unix epoch.
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Current UTC time as an RFC 3339 string with millisecond precision.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds elapsed since `start_ms`, saturating at zero.
pub fn elapsed_ms(start_ms: u128) -> u128 {
    now_ms().saturating_sub(start_ms)
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Parse a telemetry timestamp into wall-clock time.
///
/// Offsets are kept as written (the local hour is what the models see);
/// a bare date is read as midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_common_telemetry_layouts() {
        let ts = parse_timestamp("2024-03-05 14:30:00").expect("space separated");
        assert_eq!((ts.hour(), ts.weekday().num_days_from_monday()), (14, 1));

        let ts = parse_timestamp("2024-03-05T09:15:00.250").expect("iso without offset");
        assert_eq!(ts.hour(), 9);

        let ts = parse_timestamp("2024-03-05T23:10:00+05:30").expect("rfc3339");
        assert_eq!(ts.hour(), 23);

        let ts = parse_timestamp("2024-03-10").expect("date only");
        assert_eq!((ts.hour(), ts.weekday().num_days_from_monday()), (0, 6));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
