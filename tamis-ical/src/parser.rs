use chrono::TimeDelta;

use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case};
use nom::character::complete as nomchar;
use nom::combinator::{map, map_opt, opt, value};
use nom::sequence::{pair, preceded, terminated, tuple};
use nom::IResult;

use tamis_dav::types as cal;

/// Decode an iCalendar date or date-time value to UTC.
///
/// Handles "date with UTC time" (trailing Z), bare dates (read as
/// midnight UTC) and floating date-times. Floating values are read as
/// UTC too: time zone resolution is not handled yet.
pub fn date_time(dt: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    match dt.chars().last() {
        Some('Z') => chrono::NaiveDateTime::parse_from_str(dt, cal::UTC_DATETIME_FMT)
            .ok()
            .map(|v| v.and_utc()),
        Some(_) if dt.len() == 8 => chrono::NaiveDate::parse_from_str(dt, cal::DATE_FMT)
            .ok()
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .map(|v| v.and_utc()),
        Some(_) => {
            tracing::warn!(raw_time = dt, "floating datetime read as UTC");
            chrono::NaiveDateTime::parse_from_str(dt, cal::FLOATING_DATETIME_FMT)
                .ok()
                .map(|v| v.and_utc())
        }
        None => None,
    }
}

/// RFC 3389 Duration Value
///
/// ```abnf
/// dur-value  = (["+"] / "-") "P" (dur-date / dur-time / dur-week)
/// dur-date   = dur-day [dur-time]
/// dur-time   = "T" (dur-hour / dur-minute / dur-second)
/// dur-week   = 1*DIGIT "W"
/// dur-hour   = 1*DIGIT "H" [dur-minute]
/// dur-minute = 1*DIGIT "M" [dur-second]
/// dur-second = 1*DIGIT "S"
/// dur-day    = 1*DIGIT "D"
/// ```
pub fn dur_value(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(
        pair(
            dur_sign,
            preceded(tag_no_case("P"), alt((dur_week, dur_date, dur_time))),
        ),
        |(sign, delta)| delta.checked_mul(sign),
    )(text)
}

fn dur_sign(text: &str) -> IResult<&str, i32> {
    map(opt(alt((value(1, tag("+")), value(-1, tag("-"))))), |sign| {
        sign.unwrap_or(1)
    })(text)
}

fn dur_week(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(
        terminated(nomchar::i64, tag_no_case("W")),
        TimeDelta::try_weeks,
    )(text)
}

fn dur_date(text: &str) -> IResult<&str, TimeDelta> {
    map(pair(dur_day, opt(dur_time)), |(days, time)| {
        days + time.unwrap_or_else(TimeDelta::zero)
    })(text)
}

fn dur_day(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(
        terminated(nomchar::i64, tag_no_case("D")),
        TimeDelta::try_days,
    )(text)
}

fn dur_time(text: &str) -> IResult<&str, TimeDelta> {
    preceded(tag_no_case("T"), alt((dur_hour, dur_minute, dur_second)))(text)
}

fn dur_hour(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(
        tuple((nomchar::i64, tag_no_case("H"), opt(dur_minute))),
        |(hours, _, rest)| {
            TimeDelta::try_hours(hours).map(|h| h + rest.unwrap_or_else(TimeDelta::zero))
        },
    )(text)
}

fn dur_minute(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(
        tuple((nomchar::i64, tag_no_case("M"), opt(dur_second))),
        |(minutes, _, rest)| {
            TimeDelta::try_minutes(minutes).map(|m| m + rest.unwrap_or_else(TimeDelta::zero))
        },
    )(text)
}

fn dur_second(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(
        terminated(nomchar::i64, tag_no_case("S")),
        TimeDelta::try_seconds,
    )(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn utc_datetime() {
        assert_eq!(
            date_time("20240115T100000Z"),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()),
        );
    }

    #[test]
    fn bare_date_is_midnight() {
        assert_eq!(
            date_time("20240115"),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()),
        );
    }

    #[test]
    fn floating_datetime_read_as_utc() {
        assert_eq!(
            date_time("20240115T100000"),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()),
        );
    }

    #[test]
    fn garbage_datetime() {
        assert_eq!(date_time(""), None);
        assert_eq!(date_time("2024-01-15T10:00:00Z"), None);
    }

    #[test]
    fn rfc5545_mixed_duration() {
        // A duration of 15 days, 5 hours, and 20 seconds
        let (_, delta) = dur_value("P15DT5H0M20S").unwrap();
        assert_eq!(
            delta,
            TimeDelta::try_days(15).unwrap()
                + TimeDelta::try_hours(5).unwrap()
                + TimeDelta::try_seconds(20).unwrap()
        );
    }

    #[test]
    fn rfc5545_weeks_duration() {
        let (_, delta) = dur_value("P7W").unwrap();
        assert_eq!(delta, TimeDelta::try_weeks(7).unwrap());
    }

    #[test]
    fn negative_trigger_offset() {
        // 10 minutes before the occurrence
        let (_, delta) = dur_value("-PT10M").unwrap();
        assert_eq!(delta, TimeDelta::try_minutes(-10).unwrap());
    }

    #[test]
    fn negative_day_offset() {
        // an email alarm 2 days before the due date of a to-do
        let (_, delta) = dur_value("-P2D").unwrap();
        assert_eq!(delta, TimeDelta::try_days(-2).unwrap());
    }
}
