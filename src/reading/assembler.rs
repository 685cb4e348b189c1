// Telegram -> Reading
// Reference: smart_meter.py lines 92-129 (convert_message_to_data)

use super::{Reading, TIMESTAMP_KEY};
use crate::dialect::{decode_line, Dialect, Value};
use crate::telegram::{checksum, ChecksumError, ChecksumPolicy, Telegram};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    #[error("Telegram has no data lines")]
    EmptyBody,

    #[error("Checksum rejected: {0}")]
    Checksum(#[from] ChecksumError),
}

pub type Result<T> = std::result::Result<T, AssemblyError>;

/// Derived totals: (output, first addend, second addend)
const DERIVED_TOTALS: &[(&str, &str, &str)] = &[
    ("meter_total_tariff", "meter_low_tariff", "meter_normal_tariff"),
    (
        "meter_supplied_total_tariff",
        "meter_supplied_low_tariff",
        "meter_supplied_normal_tariff",
    ),
];

/// Registers report 3 decimals; sums are rounded back to that
fn round_to_meter_resolution(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Turns framed telegrams into readings
#[derive(Debug, Clone)]
pub struct ReadingAssembler {
    tz: Tz,
    checksum: ChecksumPolicy,
}

impl ReadingAssembler {
    /// `tz` is the meter's civil time zone
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            checksum: ChecksumPolicy::default(),
        }
    }

    pub fn with_checksum(mut self, policy: ChecksumPolicy) -> Self {
        self.checksum = policy;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn checksum_policy(&self) -> ChecksumPolicy {
        self.checksum
    }

    pub fn assemble(&self, telegram: &Telegram, dialect: &Dialect) -> Result<Reading> {
        self.assemble_at(telegram, dialect, Utc::now())
    }

    /// Same as `assemble`; `now` stamps readings whose telegram has no time
    pub fn assemble_at(
        &self,
        telegram: &Telegram,
        dialect: &Dialect,
        now: DateTime<Utc>,
    ) -> Result<Reading> {
        if telegram.data_lines() == 0 {
            return Err(AssemblyError::EmptyBody);
        }
        self.check(telegram)?;

        let mut reading = Reading::new(dialect.name);

        for line in telegram.body() {
            match decode_line(dialect, line, self.tz) {
                Ok(Some((key, value))) => {
                    let unit = dialect
                        .rules()
                        .iter()
                        .find(|r| r.key == key)
                        .and_then(|r| r.unit);
                    if reading.insert(key, value, unit).is_some() {
                        tracing::debug!("{} appears twice; keeping the later value", key);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Skipping field: {}", e);
                    reading.note_skipped_field();
                }
            }
        }

        for (total, a, b) in DERIVED_TOTALS {
            if let (Some(x), Some(y)) = (reading.get_f64(a), reading.get_f64(b)) {
                let unit = reading.unit(a);
                reading.insert(total, Value::Float(round_to_meter_resolution(x + y)), unit);
            }
        }

        if !reading.contains(TIMESTAMP_KEY) {
            tracing::debug!("No timestamp in telegram; using receive time");
            reading.insert(TIMESTAMP_KEY, Value::Timestamp(now), None);
        }

        Ok(reading)
    }

    fn check(&self, telegram: &Telegram) -> Result<()> {
        if self.checksum == ChecksumPolicy::Skip {
            return Ok(());
        }
        match checksum::validate(telegram) {
            Ok(()) => Ok(()),
            Err(ChecksumError::Missing) if self.checksum == ChecksumPolicy::Verify => {
                tracing::warn!(
                    "Telegram from {:?} has no checksum; decoding unverified",
                    telegram.header()
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
