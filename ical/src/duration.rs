//! RFC 5545 `DURATION` value parsing, used to resolve a VEVENT/VTODO end
//! instant when only `DTSTART` + `DURATION` are given.

use chrono::TimeDelta;
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case};
use nom::character::complete as nomchar;
use nom::combinator::{map, map_opt, opt, value};
use nom::sequence::{pair, tuple};
use nom::IResult;

/// ```abnf
/// dur-value  = (["+"] / "-") "P" (dur-date / dur-time / dur-week)
/// dur-date   = dur-day [dur-time]
/// dur-time   = "T" (dur-hour / dur-minute / dur-second)
/// dur-week   = 1*DIGIT "W"
/// ```
pub fn dur_value(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(
        tuple((
            dur_sign,
            tag_no_case("P"),
            alt((dur_date, dur_time, dur_week)),
        )),
        |(sign, _, delta)| delta.checked_mul(sign),
    )(text)
}

fn dur_sign(text: &str) -> IResult<&str, i32> {
    map(opt(alt((value(1, tag("+")), value(-1, tag("-"))))), |x| {
        x.unwrap_or(1)
    })(text)
}
fn dur_date(text: &str) -> IResult<&str, TimeDelta> {
    map(pair(dur_day, opt(dur_time)), |(day, time)| {
        day + time.unwrap_or(TimeDelta::zero())
    })(text)
}
fn dur_time(text: &str) -> IResult<&str, TimeDelta> {
    map(
        pair(tag_no_case("T"), alt((dur_hour, dur_minute, dur_second))),
        |(_, x)| x,
    )(text)
}
fn dur_week(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(pair(nomchar::i64, tag_no_case("W")), |(i, _)| {
        TimeDelta::try_weeks(i)
    })(text)
}
fn dur_day(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(pair(nomchar::i64, tag_no_case("D")), |(i, _)| {
        TimeDelta::try_days(i)
    })(text)
}
fn dur_hour(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(
        tuple((nomchar::i64, tag_no_case("H"), opt(dur_minute))),
        |(i, _, mm)| TimeDelta::try_hours(i).map(|hours| hours + mm.unwrap_or(TimeDelta::zero())),
    )(text)
}
fn dur_minute(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(
        tuple((nomchar::i64, tag_no_case("M"), opt(dur_second))),
        |(i, _, ms)| TimeDelta::try_minutes(i).map(|min| min + ms.unwrap_or(TimeDelta::zero())),
    )(text)
}
fn dur_second(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(pair(nomchar::i64, tag_no_case("S")), |(i, _)| {
        TimeDelta::try_seconds(i)
    })(text)
}

/// Parses a `DATE-TIME` value. Only the UTC form (`...Z`) is fully
/// supported; floating/local forms are accepted but treated as UTC, since
/// this server does not track per-user timezones server-side.
pub fn date_time(dt: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let fmt = match dt.chars().last() {
        Some('Z') => "%Y%m%dT%H%M%SZ",
        Some(_) => {
            tracing::trace!(raw_time = dt, "floating datetime treated as UTC");
            "%Y%m%dT%H%M%S"
        }
        None => return None,
    };
    chrono::NaiveDateTime::parse_from_str(dt, fmt)
        .ok()
        .map(|v| v.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc5545_example1() {
        let (_, delta) = dur_value("P15DT5H0M20S").unwrap();
        assert_eq!(
            delta,
            TimeDelta::try_days(15).unwrap()
                + TimeDelta::try_hours(5).unwrap()
                + TimeDelta::try_seconds(20).unwrap()
        );
    }

    #[test]
    fn rfc4791_example1() {
        let (_, delta) = dur_value("-PT10M").unwrap();
        assert_eq!(delta, TimeDelta::try_minutes(-10).unwrap());
    }

    #[test]
    fn parses_utc_datetime() {
        let dt = date_time("20260115T093000Z").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2026-01-15");
    }
}
