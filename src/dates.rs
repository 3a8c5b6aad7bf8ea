// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Date and timespan helpers backing `#…#` literals, the `date` operator and
//! date arithmetic.

use anyhow::{bail, Result};
use chrono::{
    DateTime, Datelike, Days, FixedOffset, Local, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeDelta, TimeZone,
};
use serde::{Deserialize, Serialize};

/// Calendar-aware span: whole months plus an exact millisecond remainder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timespan {
    pub months: i64,
    pub millis: i64,
}

const SECOND: i64 = 1000;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

impl Timespan {
    pub fn new(months: i64, millis: i64) -> Timespan {
        Timespan { months, millis }
    }

    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.millis == 0
    }

    pub fn negate(&self) -> Timespan {
        Timespan::new(-self.months, -self.millis)
    }

    pub fn add(&self, other: &Timespan) -> Timespan {
        Timespan::new(self.months + other.months, self.millis + other.millis)
    }
}

/// Relative date keywords understood by `#keyword#` literals and `date(:keyword)`.
pub fn is_relative_keyword(s: &str) -> bool {
    matches!(s, "now" | "today" | "yesterday" | "tomorrow")
}

pub fn now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

pub fn relative(keyword: &str) -> Option<DateTime<FixedOffset>> {
    let now = now();
    let today = now
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(*now.offset())
        .single()?;
    match keyword {
        "now" => Some(now),
        "today" => Some(today),
        "yesterday" => today.checked_sub_days(Days::new(1)),
        "tomorrow" => today.checked_add_days(Days::new(1)),
        _ => None,
    }
}

/// Parse an absolute date such as `2024-01-31`, `2024-01-31 10:15` or RFC 3339.
/// Dates without an offset are taken as UTC.
pub fn parse_date(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(text) {
        return Some(d);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M%:z"] {
        if let Ok(d) = DateTime::parse_from_str(text, fmt) {
            return Some(d);
        }
    }
    let utc = FixedOffset::east_opt(0)?;
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(d) = NaiveDateTime::parse_from_str(text, fmt) {
            return utc.from_local_datetime(&d).single();
        }
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    utc.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()
}

/// Parse a timespan such as `1 year 2 months 3d 4h 5 minutes -6s`.
pub fn parse_timespan(text: &str) -> Result<Timespan> {
    let mut span = Timespan::default();
    let mut rest = text.trim();
    if rest.is_empty() {
        bail!("empty timespan");
    }
    while !rest.is_empty() {
        let num_len = rest
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let amount: f64 = match rest[..num_len].parse() {
            Ok(n) => n,
            Err(_) => bail!("expected a number in timespan at `{rest}`"),
        };
        rest = rest[num_len..].trim_start();
        let unit_len = rest
            .char_indices()
            .find(|(_, c)| !c.is_ascii_alphabetic())
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = rest[unit_len..].trim_start_matches([' ', ',']);

        let months = match unit {
            "y" | "yr" | "yrs" | "year" | "years" => Some(12.0),
            "mo" | "month" | "months" => Some(1.0),
            _ => None,
        };
        if let Some(m) = months {
            span.months += (amount * m).round() as i64;
            continue;
        }
        let millis = match unit {
            "w" | "wk" | "week" | "weeks" => WEEK,
            "d" | "day" | "days" => DAY,
            "h" | "hr" | "hrs" | "hour" | "hours" => HOUR,
            "m" | "min" | "mins" | "minute" | "minutes" => MINUTE,
            "s" | "sec" | "secs" | "second" | "seconds" => SECOND,
            "ms" | "millisecond" | "milliseconds" => 1,
            _ => bail!("unknown timespan unit `{unit}`"),
        };
        span.millis += (amount * millis as f64).round() as i64;
    }
    Ok(span)
}

pub fn add_span(date: &DateTime<FixedOffset>, span: &Timespan) -> Option<DateTime<FixedOffset>> {
    let shifted = if span.months >= 0 {
        date.checked_add_months(Months::new(u32::try_from(span.months).ok()?))?
    } else {
        date.checked_sub_months(Months::new(u32::try_from(-span.months).ok()?))?
    };
    shifted.checked_add_signed(TimeDelta::try_milliseconds(span.millis)?)
}

/// Difference between two dates as an exact timespan.
pub fn diff(a: &DateTime<FixedOffset>, b: &DateTime<FixedOffset>) -> Timespan {
    Timespan::new(0, (*a - *b).num_milliseconds())
}

/// Text form of a date: the day alone at midnight, otherwise RFC 3339.
pub fn date_text(d: &DateTime<FixedOffset>) -> String {
    if d.time() == NaiveTime::MIN && d.offset().local_minus_utc() == 0 {
        format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day())
    } else {
        d.to_rfc3339()
    }
}

pub fn timespan_text(t: &Timespan) -> String {
    let mut parts = vec![];
    let (years, months) = (t.months / 12, t.months % 12);
    if years != 0 {
        parts.push(format!("{years}y"));
    }
    if months != 0 {
        parts.push(format!("{months}mo"));
    }
    let mut ms = t.millis;
    for (unit, size) in [("d", DAY), ("h", HOUR), ("m", MINUTE), ("s", SECOND)] {
        let n = ms / size;
        if n != 0 {
            parts.push(format!("{n}{unit}"));
            ms -= n * size;
        }
    }
    if ms != 0 || parts.is_empty() {
        parts.push(format!("{ms}ms"));
    }
    parts.join(" ")
}

/// Render with a strftime pattern.
pub fn format_date(d: &DateTime<FixedOffset>, pattern: &str) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    match write!(out, "{}", d.format(pattern)) {
        Ok(_) => out,
        // Invalid pattern.
        Err(_) => date_text(d),
    }
}
