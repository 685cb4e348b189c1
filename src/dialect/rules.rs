// Declarative field rules: OBIS identifier -> extraction -> typed value

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// How a rule cuts its value out of the line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// Fixed byte range `[start, end)` of the whole line
    Bytes { start: usize, end: usize },
    /// N-th parenthesized group after the identifier, `*unit` stripped
    Group(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Float,
    /// `YYMMDDhhmmss` plus `S`/`W` DST flag
    Timestamp,
    Text,
}

/// One row of a dialect table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    /// OBIS identifier, e.g. `1-0:1.8.1`
    pub obis: &'static str,
    pub extract: Extraction,
    pub value_type: ValueType,
    pub key: &'static str,
    pub unit: Option<&'static str>,
}

impl FieldRule {
    pub const fn float(obis: &'static str, extract: Extraction, key: &'static str, unit: &'static str) -> Self {
        Self {
            obis,
            extract,
            value_type: ValueType::Float,
            key,
            unit: Some(unit),
        }
    }

    pub const fn count(obis: &'static str, extract: Extraction, key: &'static str) -> Self {
        Self {
            obis,
            extract,
            value_type: ValueType::Float,
            key,
            unit: None,
        }
    }

    pub const fn timestamp(obis: &'static str, extract: Extraction, key: &'static str) -> Self {
        Self {
            obis,
            extract,
            value_type: ValueType::Timestamp,
            key,
            unit: None,
        }
    }

    pub const fn text(obis: &'static str, extract: Extraction, key: &'static str) -> Self {
        Self {
            obis,
            extract,
            value_type: ValueType::Text,
            key,
            unit: None,
        }
    }

    /// The identifier must be followed directly by `(`, so `1-0:1.8.1`
    /// never claims a `1-0:1.8.10` line
    pub fn matches(&self, line: &str) -> bool {
        line.strip_prefix(self.obis)
            .is_some_and(|rest| rest.starts_with('('))
    }
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{}", v),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}
