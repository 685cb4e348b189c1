// Decoded readings and where they go
pub mod assembler;
pub mod sink;

pub use assembler::{AssemblyError, ReadingAssembler};
pub use sink::{channel, ChannelSink, InfluxLineSink, JsonLinesSink, PublishError, Sink};

use crate::dialect::Value;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Key under which the telegram (or fallback) time is stored
pub const TIMESTAMP_KEY: &str = "timestamp";

/// One decoded telegram: semantic key -> value.
///
/// Built only by `ReadingAssembler`; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,

    #[serde(skip)]
    units: BTreeMap<String, &'static str>,

    #[serde(skip)]
    dialect: &'static str,

    #[serde(skip)]
    skipped_fields: usize,
}

impl Reading {
    pub(crate) fn new(dialect: &'static str) -> Self {
        Self {
            fields: BTreeMap::new(),
            units: BTreeMap::new(),
            dialect,
            skipped_fields: 0,
        }
    }

    /// Returns the previous value for `key`, if any
    pub(crate) fn insert(&mut self, key: &str, value: Value, unit: Option<&'static str>) -> Option<Value> {
        match unit {
            Some(unit) => {
                self.units.insert(key.to_string(), unit);
            }
            None => {
                self.units.remove(key);
            }
        }
        self.fields.insert(key.to_string(), value)
    }

    pub(crate) fn note_skipped_field(&mut self) {
        self.skipped_fields += 1;
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.get(TIMESTAMP_KEY).and_then(Value::as_timestamp)
    }

    pub fn unit(&self, key: &str) -> Option<&'static str> {
        self.units.get(key).copied()
    }

    /// Dialect the telegram was decoded with
    pub fn dialect(&self) -> &'static str {
        self.dialect
    }

    /// Lines that matched a rule but failed to decode
    pub fn skipped_fields(&self) -> usize {
        self.skipped_fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}
