//! Conversions between wire-level temporal integers and Rust values.
//!
//! | wire tag  | raw unit                  | decoded as                                 |
//! |-----------|---------------------------|--------------------------------------------|
//! | date      | days since 1970-01-01     | [`NaiveDate`]                              |
//! | datetime  | ms since the Unix epoch   | [`DateTime<Utc>`]                          |
//! | timestamp | ns since the Unix epoch   | ms `DateTime<Utc>`, or ISO-8601 text       |
//! | time      | ns since midnight         | `HH:MM:SS.nnnnnnnnn`                       |
//! | duration  | signed ns                 | `[-]<days>D<HH>:<MM>:<SS>.<nnnnnnnnn>`     |

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const SECONDS_PER_DAY: u64 = 86_400;

fn unix_epoch_date() -> NaiveDate {
    // chrono's default date is 1970-01-01.
    NaiveDate::default()
}

/// Days since the Unix epoch to a calendar date.
pub fn date_from_days(days: i32) -> Option<NaiveDate> {
    unix_epoch_date().checked_add_signed(TimeDelta::try_days(i64::from(days))?)
}

/// Milliseconds since the Unix epoch of `date` at UTC midnight.
pub fn date_to_millis(date: NaiveDate) -> i64 {
    date.signed_duration_since(unix_epoch_date()).num_milliseconds()
}

/// Milliseconds since the Unix epoch to a UTC datetime.
pub fn datetime_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Nanosecond timestamp truncated (toward zero) to millisecond precision.
pub fn timestamp_to_datetime(nanos: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(nanos / NANOS_PER_MILLI)
}

/// Nanosecond timestamp as ISO-8601 text with nine fractional digits and no
/// zone suffix, e.g. `1992-10-29T22:31:32.842033999`.
pub fn format_timestamp_nanos(nanos: i64) -> String {
    DateTime::from_timestamp_nanos(nanos)
        .format("%Y-%m-%dT%H:%M:%S%.9f")
        .to_string()
}

/// Nanoseconds since midnight as `HH:MM:SS.nnnnnnnnn`.
///
/// Hours are not wrapped at 24. Negative input is rendered with a leading `-`.
pub fn format_time(nanos: i64) -> String {
    let sign = if nanos < 0 { "-" } else { "" };
    let abs = nanos.unsigned_abs();
    let seconds = abs / NANOS_PER_SECOND;
    format!(
        "{sign}{:02}:{:02}:{:02}.{:09}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60,
        abs % NANOS_PER_SECOND
    )
}

/// Signed nanoseconds as `[-]<days>D<HH>:<MM>:<SS>.<nnnnnnnnn>`.
pub fn format_duration(nanos: i64) -> String {
    let sign = if nanos < 0 { "-" } else { "" };
    let abs = nanos.unsigned_abs();
    let seconds = abs / NANOS_PER_SECOND;
    format!(
        "{sign}{}D{:02}:{:02}:{:02}.{:09}",
        seconds / SECONDS_PER_DAY,
        seconds / 3600 % 24,
        seconds / 60 % 60,
        seconds % 60,
        abs % NANOS_PER_SECOND
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_from_days_before_and_after_epoch() {
        assert_eq!(date_from_days(-4497), NaiveDate::from_ymd_opt(1957, 9, 9));
        assert_eq!(date_from_days(0x2077), NaiveDate::from_ymd_opt(1992, 10, 3));
    }

    #[test]
    fn test_date_to_millis_is_utc_midnight() {
        let date = NaiveDate::from_ymd_opt(2022, 10, 4).unwrap();
        assert_eq!(date_to_millis(date), 1_664_841_600_000);
    }

    #[test]
    fn test_timestamp_to_datetime_truncates_to_millis() {
        let expected = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(timestamp_to_datetime(1), Some(expected));
        assert_eq!(
            timestamp_to_datetime(i64::MAX).map(|d| d.timestamp_millis()),
            Some(9_223_372_036_854)
        );
    }

    #[test]
    fn test_format_timestamp_nanos() {
        assert_eq!(format_timestamp_nanos(0), "1970-01-01T00:00:00.000000000");
        assert_eq!(format_timestamp_nanos(1), "1970-01-01T00:00:00.000000001");
        assert_eq!(
            format_timestamp_nanos(i64::MAX),
            "2262-04-11T23:47:16.854775807"
        );
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(51_109_668_000_000), "14:11:49.668000000");
        assert_eq!(format_time(86_399_999_999_999), "23:59:59.999999999");
        assert_eq!(format_time(0), "00:00:00.000000000");
    }

    #[test]
    fn test_format_duration_signs() {
        assert_eq!(format_duration(21_110_218_577_000), "0D05:51:50.218577000");
        assert_eq!(format_duration(-21_110_218_577_000), "-0D05:51:50.218577000");
        assert_eq!(format_duration(90_061_000_000_001), "1D01:01:01.000000001");
    }

    #[test]
    fn test_format_duration_handles_i64_min() {
        // |i64::MIN| does not fit in i64; unsigned_abs keeps it exact.
        assert!(format_duration(i64::MIN).starts_with("-106751D23:47:16.854775808"));
    }
}
