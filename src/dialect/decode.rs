// Line decoding: apply the first matching rule of a dialect
// Reference: smart_meter.py lines 92-129 (convert_message_to_data)

use super::registry::Dialect;
use super::rules::{Extraction, FieldRule, Value, ValueType};
use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::{OffsetComponents, Tz};
use nom::{
    bytes::complete::{take_till, take_while_m_n},
    character::complete::{char, one_of},
    combinator::{all_consuming, opt},
    multi::many1,
    sequence::delimited,
    IResult, Parser,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("{key}: bytes {start}..{end} outside line of {len} bytes")]
    OutOfRange {
        key: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("{key}: no value group {index}")]
    MissingGroup { key: &'static str, index: usize },

    #[error("{key}: {text:?} is not a number")]
    NotNumeric { key: &'static str, text: String },

    #[error("{key}: {text:?} is not a YYMMDDhhmmss timestamp")]
    BadTimestamp { key: &'static str, text: String },

    #[error("{key}: timestamp {text:?} lacks the S/W daylight-saving flag")]
    MissingDstFlag { key: &'static str, text: String },

    #[error("{key}: local time {local} does not exist in {zone}")]
    NonexistentLocalTime {
        key: &'static str,
        local: NaiveDateTime,
        zone: Tz,
    },
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Decode one telegram line with `dialect`.
///
/// `Ok(None)` for lines no rule claims; `Err` when a rule matched but its
/// value could not be coerced. Timestamps are read as civil time in `tz`.
pub fn decode_line(dialect: &Dialect, line: &str, tz: Tz) -> Result<Option<(&'static str, Value)>> {
    let Some(rule) = dialect.rules().iter().find(|r| r.matches(line)) else {
        return Ok(None);
    };
    let value = decode_with(rule, line, tz)?;
    Ok(Some((rule.key, value)))
}

/// Apply a single rule to a line it matched
pub fn decode_with(rule: &FieldRule, line: &str, tz: Tz) -> Result<Value> {
    let text = extract(rule, line)?;

    match rule.value_type {
        ValueType::Float => parse_decimal(rule.key, text).map(Value::Float),
        ValueType::Timestamp => parse_timestamp(rule.key, text, tz).map(Value::Timestamp),
        ValueType::Text => Ok(Value::Text(text.trim().to_string())),
    }
}

fn extract<'a>(rule: &FieldRule, line: &'a str) -> Result<&'a str> {
    match rule.extract {
        Extraction::Bytes { start, end } => line.get(start..end).ok_or(DecodeError::OutOfRange {
            key: rule.key,
            start,
            end,
            len: line.len(),
        }),
        Extraction::Group(index) => {
            let rest = &line[rule.obis.len()..];
            let group = value_groups(rest)
                .ok()
                .and_then(|(_, groups)| groups.into_iter().nth(index))
                .ok_or(DecodeError::MissingGroup {
                    key: rule.key,
                    index,
                })?;
            Ok(group.split_once('*').map_or(group, |(value, _unit)| value))
        }
    }
}

/// `(a)(b*unit)...` -> ["a", "b*unit"]
fn value_groups(input: &str) -> IResult<&str, Vec<&str>> {
    many1(delimited(char('('), take_till(|c| c == ')'), char(')'))).parse(input)
}

fn parse_decimal(key: &'static str, text: &str) -> Result<f64> {
    let trimmed = text.trim();
    let well_formed = !trimmed.is_empty()
        && trimmed.chars().any(|c| c.is_ascii_digit())
        && trimmed
            .chars()
            .enumerate()
            .all(|(i, c)| c.is_ascii_digit() || c == '.' || (i == 0 && c == '-'));

    if !well_formed {
        return Err(DecodeError::NotNumeric {
            key,
            text: text.to_string(),
        });
    }
    trimmed.parse::<f64>().map_err(|_| DecodeError::NotNumeric {
        key,
        text: text.to_string(),
    })
}

/// Split `YYMMDDhhmmss` + optional DST flag
fn timestamp_parts(input: &str) -> IResult<&str, (&str, Option<char>)> {
    all_consuming((
        take_while_m_n(12, 12, |c: char| c.is_ascii_digit()),
        opt(one_of("SW")),
    ))
    .parse(input)
}

/// Interpret a meter timestamp in `tz` and convert it to UTC
pub fn parse_timestamp(key: &'static str, text: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let bad = || DecodeError::BadTimestamp {
        key,
        text: text.to_string(),
    };

    let (_, (digits, flag)) = timestamp_parts(text.trim()).map_err(|_| bad())?;
    let summer = match flag {
        Some(flag) => flag == 'S',
        None => {
            return Err(DecodeError::MissingDstFlag {
                key,
                text: text.to_string(),
            })
        }
    };

    // digits is 12 ASCII digits, so these slices and parses cannot fail
    let field = |i: usize| digits[i..i + 2].parse::<u32>().unwrap_or_default();
    let local = NaiveDate::from_ymd_opt(2000 + field(0) as i32, field(2), field(4))
        .and_then(|d| d.and_hms_opt(field(6), field(8), field(10)))
        .ok_or_else(bad)?;

    let is_dst = |dt: &DateTime<Tz>| dt.offset().dst_offset() != TimeDelta::zero();

    let resolved = match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => {
            if is_dst(&dt) != summer {
                tracing::debug!(
                    "{}: DST flag {} disagrees with {} at {}",
                    key,
                    if summer { 'S' } else { 'W' },
                    tz,
                    local
                );
            }
            dt
        }
        LocalResult::Ambiguous(a, b) => {
            // Autumn fold: the flag says which of the two wall-clock hours
            if is_dst(&a) == summer {
                a
            } else {
                b
            }
        }
        LocalResult::None => {
            return Err(DecodeError::NonexistentLocalTime {
                key,
                local,
                zone: tz,
            })
        }
    };

    Ok(resolved.with_timezone(&Utc))
}
