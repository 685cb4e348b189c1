// Dialect tables and the process-wide dialect registry
// Reference: smart_meter.py lines 92-129 (convert_message_to_data)

use super::rules::{Extraction, FieldRule};
use crate::telegram::{Identification, Telegram};
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialectError {
    #[error("Dialect {dialect}: OBIS identifier {obis} appears more than once")]
    DuplicatePrefix {
        dialect: &'static str,
        obis: &'static str,
    },

    #[error("Dialect {0} is already registered")]
    DuplicateName(&'static str),

    #[error("Unknown dialect: {0}")]
    Unknown(String),
}

/// Field rules for one meter vendor/firmware family
#[derive(Debug, PartialEq, Eq)]
pub struct Dialect {
    pub name: &'static str,
    pub description: &'static str,
    /// FLAG manufacturer codes from the identification line
    pub vendor_idents: &'static [&'static str],
    /// Substrings that mark a header even when its `/` was lost
    pub start_markers: &'static [&'static str],
    /// Framer ceiling for this meter family
    pub max_lines: usize,
    rules: &'static [FieldRule],
}

impl Dialect {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        vendor_idents: &'static [&'static str],
        start_markers: &'static [&'static str],
        max_lines: usize,
        rules: &'static [FieldRule],
    ) -> Self {
        Self {
            name,
            description,
            vendor_idents,
            start_markers,
            max_lines,
            rules,
        }
    }

    pub fn rules(&self) -> &'static [FieldRule] {
        self.rules
    }

    pub fn rule_for(&self, obis: &str) -> Option<&'static FieldRule> {
        self.rules.iter().find(|r| r.obis == obis)
    }

    /// Output keys this dialect can produce
    pub fn keys(&self) -> impl Iterator<Item = &'static str> {
        self.rules.iter().map(|r| r.key)
    }

    pub fn matches_vendor(&self, ident: &Identification) -> bool {
        self.vendor_idents.iter().any(|v| *v == ident.manufacturer)
    }

    /// OBIS identifiers must be unique within a dialect
    pub fn validate(&self) -> Result<(), DialectError> {
        let mut seen = HashSet::new();
        for rule in self.rules {
            if !seen.insert(rule.obis) {
                return Err(DialectError::DuplicatePrefix {
                    dialect: self.name,
                    obis: rule.obis,
                });
            }
        }
        Ok(())
    }
}

const fn bytes(start: usize, end: usize) -> Extraction {
    Extraction::Bytes { start, end }
}

const FIRST: Extraction = Extraction::Group(0);
const SECOND: Extraction = Extraction::Group(1);

// Fixed column layout of the MA105 firmware
static KAIFA_RULES: &[FieldRule] = &[
    FieldRule::timestamp("0-0:1.0.0", bytes(10, 23), "timestamp"),
    FieldRule::text("0-0:96.1.1", FIRST, "equipment_id"),
    FieldRule::float("1-0:1.8.1", bytes(10, 20), "meter_low_tariff", "kWh"),
    FieldRule::float("1-0:1.8.2", bytes(10, 20), "meter_normal_tariff", "kWh"),
    FieldRule::float("1-0:2.8.1", bytes(10, 20), "meter_supplied_low_tariff", "kWh"),
    FieldRule::float("1-0:2.8.2", bytes(10, 20), "meter_supplied_normal_tariff", "kWh"),
    FieldRule::text("0-0:96.14.0", bytes(12, 16), "tariff_indicator"),
    FieldRule::float("1-0:1.7.0", bytes(10, 16), "current_energy_usage", "kW"),
    FieldRule::float("1-0:2.7.0", bytes(10, 16), "current_energy_supply", "kW"),
    FieldRule::count("0-0:96.7.21", bytes(12, 17), "power_failures"),
    FieldRule::float("0-1:24.2.1", bytes(26, 35), "current_gas_usage", "m3"),
];

static ISKRA_RULES: &[FieldRule] = &[
    FieldRule::timestamp("0-0:1.0.0", bytes(10, 23), "timestamp"),
    FieldRule::text("0-0:96.1.1", FIRST, "equipment_id"),
    FieldRule::float("1-0:1.8.1", bytes(10, 20), "meter_low_tariff", "kWh"),
    FieldRule::float("1-0:1.8.2", bytes(10, 20), "meter_normal_tariff", "kWh"),
    FieldRule::float("1-0:2.8.1", bytes(10, 20), "meter_supplied_low_tariff", "kWh"),
    FieldRule::float("1-0:2.8.2", bytes(10, 20), "meter_supplied_normal_tariff", "kWh"),
    FieldRule::text("0-0:96.14.0", bytes(12, 16), "tariff_indicator"),
    FieldRule::float("1-0:1.7.0", bytes(10, 16), "current_energy_usage", "kW"),
    FieldRule::float("1-0:2.7.0", bytes(10, 16), "current_energy_supply", "kW"),
    FieldRule::count("0-0:96.7.21", bytes(12, 17), "power_failures"),
    FieldRule::float("1-0:32.7.0", bytes(11, 16), "voltage_l1", "V"),
    FieldRule::float("1-0:52.7.0", bytes(11, 16), "voltage_l2", "V"),
    FieldRule::float("1-0:72.7.0", bytes(11, 16), "voltage_l3", "V"),
    FieldRule::float("1-0:31.7.0", bytes(11, 14), "current_l1", "A"),
    FieldRule::float("0-1:24.2.1", bytes(26, 35), "current_gas_usage", "m3"),
];

// Widths vary between firmware revisions, so everything goes by group
static LANDIS_GYR_RULES: &[FieldRule] = &[
    FieldRule::timestamp("0-0:1.0.0", FIRST, "timestamp"),
    FieldRule::text("0-0:96.1.1", FIRST, "equipment_id"),
    FieldRule::float("1-0:1.8.1", FIRST, "meter_low_tariff", "kWh"),
    FieldRule::float("1-0:1.8.2", FIRST, "meter_normal_tariff", "kWh"),
    FieldRule::float("1-0:2.8.1", FIRST, "meter_supplied_low_tariff", "kWh"),
    FieldRule::float("1-0:2.8.2", FIRST, "meter_supplied_normal_tariff", "kWh"),
    FieldRule::text("0-0:96.14.0", FIRST, "tariff_indicator"),
    FieldRule::float("1-0:1.7.0", FIRST, "current_energy_usage", "kW"),
    FieldRule::float("1-0:2.7.0", FIRST, "current_energy_supply", "kW"),
    FieldRule::count("0-0:96.7.21", FIRST, "power_failures"),
    FieldRule::float("1-0:32.7.0", FIRST, "voltage_l1", "V"),
    FieldRule::float("1-0:52.7.0", FIRST, "voltage_l2", "V"),
    FieldRule::float("1-0:72.7.0", FIRST, "voltage_l3", "V"),
    FieldRule::float("1-0:31.7.0", FIRST, "current_l1", "A"),
    FieldRule::float("1-0:51.7.0", FIRST, "current_l2", "A"),
    FieldRule::float("1-0:71.7.0", FIRST, "current_l3", "A"),
    FieldRule::float("0-1:24.2.1", SECOND, "current_gas_usage", "m3"),
];

// Fields every P1 meter sends
static DEFAULT_RULES: &[FieldRule] = &[
    FieldRule::float("1-0:1.8.1", FIRST, "meter_low_tariff", "kWh"),
    FieldRule::float("1-0:1.8.2", FIRST, "meter_normal_tariff", "kWh"),
    FieldRule::float("1-0:1.7.0", FIRST, "current_energy_usage", "kW"),
];

pub static KAIFA: Dialect = Dialect::new(
    "kaifa",
    "Kaifa MA105/MA304 (DSMR 4.x)",
    &["KFM"],
    &["KAIFA"],
    40,
    KAIFA_RULES,
);

pub static ISKRA: Dialect = Dialect::new(
    "iskra",
    "Iskraemeco MT382/AM550 (DSMR 4.x)",
    &["ISk", "ISK"],
    &[],
    48,
    ISKRA_RULES,
);

pub static LANDIS_GYR: Dialect = Dialect::new(
    "landis-gyr",
    "Landis+Gyr E350/E360 (DSMR 4.2/5.0)",
    &["XMX"],
    &[],
    64,
    LANDIS_GYR_RULES,
);

pub static DEFAULT_DIALECT: Dialect = Dialect::new(
    "default",
    "Minimal fallback: tariffs and instantaneous usage",
    &[],
    &[],
    crate::telegram::framer::DEFAULT_MAX_LINES,
    DEFAULT_RULES,
);

/// Global dialect registry, seeded with the built-in tables
lazy_static::lazy_static! {
    static ref DIALECT_REGISTRY: RwLock<Vec<&'static Dialect>> =
        RwLock::new(vec![&KAIFA, &ISKRA, &LANDIS_GYR, &DEFAULT_DIALECT]);
}

/// Add a dialect; its rules are validated first
pub fn register_dialect(dialect: &'static Dialect) -> Result<(), DialectError> {
    dialect.validate()?;
    let mut registry = DIALECT_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    if registry.iter().any(|d| d.name == dialect.name) {
        return Err(DialectError::DuplicateName(dialect.name));
    }
    registry.push(dialect);
    Ok(())
}

/// Look up a dialect by name
pub fn get_dialect(name: &str) -> Option<&'static Dialect> {
    DIALECT_REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .find(|d| d.name.eq_ignore_ascii_case(name))
        .copied()
}

/// List all registered dialects
pub fn list_dialects() -> Vec<&'static Dialect> {
    DIALECT_REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Pick the dialect for a meter identification, falling back to `default`
pub fn detect_dialect(ident: Option<&Identification>) -> &'static Dialect {
    ident
        .and_then(|ident| {
            list_dialects()
                .into_iter()
                .find(|d| d.matches_vendor(ident))
        })
        .unwrap_or(&DEFAULT_DIALECT)
}

/// Vendor start markers of every registered dialect
pub fn all_start_markers() -> Vec<String> {
    list_dialects()
        .iter()
        .flat_map(|d| d.start_markers.iter().map(|m| m.to_string()))
        .collect()
}

/// Fixed dialect for the whole run, or detection per telegram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectSelection {
    Auto,
    Fixed(&'static Dialect),
}

impl DialectSelection {
    /// "auto" or a registered dialect name
    pub fn from_name(name: &str) -> Result<Self, DialectError> {
        if name.eq_ignore_ascii_case("auto") {
            return Ok(DialectSelection::Auto);
        }
        get_dialect(name)
            .map(DialectSelection::Fixed)
            .ok_or_else(|| DialectError::Unknown(name.to_string()))
    }

    pub fn resolve(&self, telegram: &Telegram) -> &'static Dialect {
        match self {
            DialectSelection::Fixed(dialect) => dialect,
            DialectSelection::Auto => {
                let ident = telegram.identification();
                let dialect = detect_dialect(ident.as_ref());
                tracing::trace!(
                    "Telegram {:?} decoded as {}",
                    telegram.header(),
                    dialect.name
                );
                dialect
            }
        }
    }

    /// Framer start markers appropriate for this selection
    pub fn start_markers(&self) -> Vec<String> {
        match self {
            DialectSelection::Fixed(dialect) => {
                dialect.start_markers.iter().map(|m| m.to_string()).collect()
            }
            DialectSelection::Auto => all_start_markers(),
        }
    }

    /// Framer ceiling implied by this selection
    pub fn max_lines(&self) -> usize {
        match self {
            DialectSelection::Fixed(dialect) => dialect.max_lines,
            DialectSelection::Auto => list_dialects()
                .iter()
                .map(|d| d.max_lines)
                .max()
                .unwrap_or(crate::telegram::framer::DEFAULT_MAX_LINES),
        }
    }
}
