// Reading sinks: JSON lines, InfluxDB line protocol, and an in-process queue
// Reference: smart_meter.py lines 132-141 (send_data_to_influxdb)

use super::{Reading, TIMESTAMP_KEY};
use crate::dialect::Value;
use std::io::{self, Write};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Reading queue is full")]
    QueueFull,

    #[error("Reading queue consumer has gone away")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, PublishError>;

/// Destination for finished readings
#[allow(async_fn_in_trait)]
pub trait Sink {
    async fn publish(&mut self, reading: Reading) -> Result<()>;
}

/// Collects readings in memory
impl Sink for Vec<Reading> {
    async fn publish(&mut self, reading: Reading) -> Result<()> {
        self.push(reading);
        Ok(())
    }
}

/// One JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    async fn publish(&mut self, reading: Reading) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &reading)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Default measurement name for line protocol output
pub const DEFAULT_MEASUREMENT: &str = "smart_meter";

/// InfluxDB line protocol; the reading's timestamp becomes the point time
pub struct InfluxLineSink<W: Write> {
    writer: W,
    measurement: String,
}

impl<W: Write> InfluxLineSink<W> {
    pub fn new(writer: W) -> Self {
        Self::with_measurement(writer, DEFAULT_MEASUREMENT)
    }

    pub fn with_measurement(writer: W, measurement: impl Into<String>) -> Self {
        Self {
            writer,
            measurement: measurement.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn escape_measurement(name: &str) -> String {
    name.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_string_field(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render one reading as a line protocol point (no trailing newline)
pub fn to_line_protocol(measurement: &str, reading: &Reading) -> String {
    let fields: Vec<String> = reading
        .iter()
        .filter(|(key, _)| *key != TIMESTAMP_KEY)
        .map(|(key, value)| match value {
            Value::Float(v) => format!("{}={}", key, v),
            Value::Text(s) => format!("{}=\"{}\"", key, escape_string_field(s)),
            Value::Timestamp(ts) => format!("{}=\"{}\"", key, Value::Timestamp(*ts)),
        })
        .collect();

    let mut line = format!("{} {}", escape_measurement(measurement), fields.join(","));
    if let Some(nanos) = reading.timestamp().and_then(|ts| ts.timestamp_nanos_opt()) {
        line.push(' ');
        line.push_str(&nanos.to_string());
    }
    line
}

impl<W: Write> Sink for InfluxLineSink<W> {
    async fn publish(&mut self, reading: Reading) -> Result<()> {
        // Line protocol needs at least one field
        if reading.iter().all(|(key, _)| key == TIMESTAMP_KEY) {
            tracing::debug!("Reading has no fields to write");
            return Ok(());
        }
        writeln!(self.writer, "{}", to_line_protocol(&self.measurement, &reading))?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Producer half of the decode -> publish queue.
///
/// Never waits: a full queue is reported as `QueueFull` and the reading is
/// dropped, so decoding keeps pace with the meter.
pub struct ChannelSink {
    tx: mpsc::Sender<Reading>,
}

/// Bounded single-producer/single-consumer reading queue
pub fn channel(capacity: usize) -> (ChannelSink, mpsc::Receiver<Reading>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelSink { tx }, rx)
}

impl Sink for ChannelSink {
    async fn publish(&mut self, reading: Reading) -> Result<()> {
        self.tx.try_send(reading).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PublishError::Disconnected,
        })
    }
}
