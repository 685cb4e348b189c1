// Service configuration: JSON file, then environment overrides
// Reference: smart_meter.py lines 22-47 (init_logger, open_serial_client)

use crate::dialect::{DialectError, DialectSelection};
use crate::reading::ReadingAssembler;
use crate::serial::SerialConfig;
use crate::telegram::{ChecksumPolicy, FramerConfig};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown time zone: {0}")]
    UnknownTimezone(String),

    #[error(transparent)]
    Dialect(#[from] DialectError),

    #[error("Invalid checksum policy: {0}")]
    ChecksumPolicy(String),

    #[error("Invalid data bits: {0} (expected 7 or 8)")]
    DataBits(u8),

    #[error("Invalid parity: {0} (expected none, even or odd)")]
    Parity(String),

    #[error("Invalid output format: {0} (expected json or influx)")]
    Output(String),

    #[error("max_lines must be at least 2, got {0}")]
    MaxLines(usize),

    #[error("Bad value {value:?} for {var}")]
    Env { var: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Influx,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "influx" | "influxdb" => Ok(OutputFormat::Influx),
            _ => Err(ConfigError::Output(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: String,
    pub read_timeout_secs: u64,
    /// "auto" or a registered dialect name
    pub dialect: String,
    /// IANA zone of the meter's clock
    pub timezone: String,
    /// Framer ceiling; the dialect's own hint when unset
    pub max_lines: Option<usize>,
    pub checksum: String,
    pub output: OutputFormat,
    pub queue_capacity: usize,
    /// Consecutive read failures before giving up; unset retries forever
    pub max_transport_failures: Option<u32>,
    pub log_level: String,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            data_bits: 7,
            parity: "even".to_string(),
            read_timeout_secs: 20,
            dialect: "auto".to_string(),
            timezone: "Europe/Amsterdam".to_string(),
            max_lines: None,
            checksum: "verify".to_string(),
            output: OutputFormat::Json,
            queue_capacity: 16,
            max_transport_failures: None,
            log_level: "warn".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

impl MeterConfig {
    /// Defaults, optionally overlaid by a JSON file, then by the process
    /// environment. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |var| std::env::var(var).ok())
    }

    /// `load` with an explicit environment lookup
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::from_json(&fs::read_to_string(path)?)?
            }
            None => Self::default(),
        };
        config.apply_env_with(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("P1_PORT") {
            self.port = v;
        }
        if let Some(v) = lookup("BAUD_RATE") {
            self.baud_rate = parse_env("BAUD_RATE", v)?;
        }
        if let Some(v) = lookup("P1_DATA_BITS") {
            self.data_bits = parse_env("P1_DATA_BITS", v)?;
        }
        if let Some(v) = lookup("P1_PARITY") {
            self.parity = v;
        }
        if let Some(v) = lookup("P1_TIMEOUT") {
            self.read_timeout_secs = parse_env("P1_TIMEOUT", v)?;
        }
        if let Some(v) = lookup("P1_DIALECT") {
            self.dialect = v;
        }
        if let Some(v) = lookup("P1_TIMEZONE") {
            self.timezone = v;
        }
        if let Some(v) = lookup("P1_MAX_LINES") {
            self.max_lines = Some(parse_env("P1_MAX_LINES", v)?);
        }
        if let Some(v) = lookup("P1_CHECKSUM") {
            self.checksum = v;
        }
        if let Some(v) = lookup("P1_OUTPUT") {
            self.output = v.parse()?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.timezone()?;
        self.checksum_policy()?;
        self.serial_config()?;
        let selection = self.dialect_selection()?;
        let max_lines = self.max_lines.unwrap_or_else(|| selection.max_lines());
        if max_lines < 2 {
            return Err(ConfigError::MaxLines(max_lines));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }

    pub fn dialect_selection(&self) -> Result<DialectSelection> {
        Ok(DialectSelection::from_name(&self.dialect)?)
    }

    pub fn checksum_policy(&self) -> Result<ChecksumPolicy> {
        self.checksum.parse().map_err(ConfigError::ChecksumPolicy)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn serial_config(&self) -> Result<SerialConfig> {
        let data_bits = match self.data_bits {
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => return Err(ConfigError::DataBits(other)),
        };
        let parity = match self.parity.to_ascii_lowercase().as_str() {
            "none" | "n" => serialport::Parity::None,
            "even" | "e" => serialport::Parity::Even,
            "odd" | "o" => serialport::Parity::Odd,
            _ => return Err(ConfigError::Parity(self.parity.clone())),
        };
        Ok(SerialConfig {
            data_bits,
            parity,
            ..SerialConfig::new(self.baud_rate).with_timeout(self.read_timeout())
        })
    }

    pub fn framer_config(&self, selection: &DialectSelection) -> FramerConfig {
        FramerConfig {
            max_lines: self.max_lines.unwrap_or_else(|| selection.max_lines()),
            start_markers: selection.start_markers(),
        }
    }

    pub fn assembler(&self) -> Result<ReadingAssembler> {
        Ok(ReadingAssembler::new(self.timezone()?).with_checksum(self.checksum_policy()?))
    }
}
