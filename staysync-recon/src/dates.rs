//! Tolerant timestamp parsing
//!
//! Channels report dates in whatever format their extranet shows:
//! ISO 8601, `2024.05.10`, `2024/05/10`, `2024년 05월 10일 (금) 15:00`,
//! `10 May 2024`, `May 10, 2024 3:00 PM`. Everything parses to a wall-clock
//! `NaiveDateTime`; date-only input yields midnight. `None` means the value
//! is unusable and the caller must reject the record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

static PARENTHESIZED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)").expect("parenthesized regex is valid"));

static LEADING_WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+")
        .expect("weekday regex is valid")
});

static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})\s*[-./]\s*(\d{1,2})\s*[-./]\s*(\d{1,2})\.?\s*(?:T\s*)?(.*)$")
        .expect("numeric date regex is valid")
});

static CLOCK_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2})(?::(\d{2})(?:\.\d+)?)?\s*([AaPp][Mm])?$")
        .expect("clock time regex is valid")
});

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M%:z"];

const MONTH_NAME_DATETIME_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %I:%M %p",
    "%b %d, %Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%b %d %Y %H:%M",
];

const MONTH_NAME_DATE_FORMATS: &[&str] = &["%d %b %Y", "%b %d, %Y", "%b %d %Y"];

/// Parse a channel-reported timestamp
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(ts) = parse_with_offset(trimmed) {
        return Some(ts);
    }

    let cleaned = clean(trimmed);
    parse_numeric(&cleaned).or_else(|| parse_month_name(&cleaned))
}

/// True if the text carries a clock time (`HH:MM`)
pub fn has_clock_time(raw: &str) -> bool {
    static EMBEDDED_TIME: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\d{1,2}:\d{2}").expect("embedded time regex is valid"));
    EMBEDDED_TIME.is_match(raw)
}

/// Offset-qualified timestamps keep the wall clock of their own offset
fn parse_with_offset(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.naive_local())
}

/// Drop weekday annotations and Korean date markers, collapse whitespace
fn clean(raw: &str) -> String {
    let without_parens = PARENTHESIZED.replace_all(raw, " ");
    let replaced = without_parens
        .replace('년', "-")
        .replace('월', "-")
        .replace('일', " ");
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    LEADING_WEEKDAY.replace(&collapsed, "").into_owned()
}

fn parse_numeric(cleaned: &str) -> Option<NaiveDateTime> {
    let caps = NUMERIC_DATE.captures(cleaned)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = parse_clock(caps.get(4).map(|m| m.as_str()).unwrap_or(""))?;
    Some(date.and_time(time))
}

fn parse_clock(rest: &str) -> Option<NaiveTime> {
    let rest = rest.trim();
    if rest.is_empty() {
        return NaiveTime::from_hms_opt(0, 0, 0);
    }

    let caps = CLOCK_TIME.captures(rest)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    let second: u32 = match caps.get(3) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };

    if let Some(meridiem) = caps.get(4) {
        if hour == 0 || hour > 12 {
            return None;
        }
        let pm = meridiem.as_str().eq_ignore_ascii_case("pm");
        hour = match (pm, hour) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }

    NaiveTime::from_hms_opt(hour, minute, second)
}

fn parse_month_name(cleaned: &str) -> Option<NaiveDateTime> {
    MONTH_NAME_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(cleaned, fmt).ok())
        .or_else(|| {
            MONTH_NAME_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(cleaned, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
