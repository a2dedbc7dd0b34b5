//! Parsing of `from`/`until` request parameters.
//!
//! Accepted forms, after lowercasing and stripping `_`, `,` and spaces:
//!
//! - epoch seconds: `1444508126`
//! - absolute UTC time as `HH:MMYYYYMMDD`: `04:0020151011`
//! - `now`, optionally followed by an offset: `now-24h`, `now+1d12h`
//! - a bare offset relative to now: `-1w`

use chrono::NaiveDateTime;
use common::Clock;

use crate::error::{Error, Result};

const ABSOLUTE_FORMAT: &str = "%H:%M%Y%m%d";

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Resolves a time parameter to epoch seconds.
pub fn parse_at_time(input: &str, clock: &dyn Clock) -> Result<i64> {
    let s: String = input
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '_' | ',' | ' '))
        .collect();

    if let Ok(epoch) = s.parse::<i64>() {
        return Ok(epoch);
    }

    if s.contains(':') && s.len() == 13 {
        return NaiveDateTime::parse_from_str(&s, ABSOLUTE_FORMAT)
            .map(|t| t.and_utc().timestamp())
            .map_err(|e| Error::Argument(format!("invalid time format ({}): {}", s, e)));
    }

    let (reference, offset) = match s.find(['+', '-']) {
        Some(i) => s.split_at(i),
        None => (s.as_str(), ""),
    };
    if !reference.is_empty() && reference != "now" {
        return Err(Error::Argument(format!(
            "unsupported time reference ({})",
            s
        )));
    }

    clock
        .now_secs()
        .checked_add(parse_offset(offset)?)
        .ok_or_else(|| out_of_range(&s))
}

fn out_of_range(input: &str) -> Error {
    Error::Argument(format!("time out of range ({})", input))
}

/// Parses a signed run of `<count><unit>` groups into seconds.
fn parse_offset(offset: &str) -> Result<i64> {
    let (sign, mut rest) = match offset.as_bytes().first() {
        None => return Ok(0),
        Some(b'+') => (1, &offset[1..]),
        Some(b'-') => (-1, &offset[1..]),
        Some(_) => (1, offset),
    };

    let mut total = 0i64;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (count, tail) = rest.split_at(digits);
        let letters = tail
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(letters);
        rest = tail;

        let count: i64 = count
            .parse()
            .map_err(|_| Error::Argument(format!("invalid offset amount in ({})", offset)))?;
        total = unit_seconds(unit)?
            .checked_mul(count)
            .and_then(|secs| total.checked_add(sign * secs))
            .ok_or_else(|| out_of_range(offset))?;
    }
    Ok(total)
}

fn unit_seconds(unit: &str) -> Result<i64> {
    let seconds = if unit.starts_with('s') {
        1
    } else if unit == "m" || unit.starts_with("min") {
        MINUTE
    } else if unit.starts_with('h') {
        HOUR
    } else if unit.starts_with('d') {
        DAY
    } else if unit.starts_with('w') {
        7 * DAY
    } else if unit.starts_with("mon") {
        30 * DAY
    } else if unit.starts_with('y') {
        365 * DAY
    } else {
        return Err(Error::Argument(format!("invalid offset unit ({})", unit)));
    };
    Ok(seconds)
}
