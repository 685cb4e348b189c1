// Telegram integrity check (CRC-16/ARC over the wire bytes)

use super::raw::Telegram;
use nom::{character::complete::hex_digit1, combinator::all_consuming, Parser};
use thiserror::Error;

/// Reflected polynomial of CRC-16/ARC (0x8005 bit-reversed)
const CRC16_ARC_POLY: u16 = 0xA001;

/// Number of hex digits after `!`
pub const CHECKSUM_DIGITS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    #[error("CRC mismatch: telegram declares {declared:04X}, computed {computed:04X}")]
    Mismatch { declared: u16, computed: u16 },

    #[error("Telegram carries no checksum")]
    Missing,

    #[error("Unreadable checksum field: {0:?}")]
    Invalid(String),
}

impl ChecksumError {
    /// Missing checksums are expected from older dialects
    pub fn is_advisory(&self) -> bool {
        matches!(self, ChecksumError::Missing)
    }
}

/// How the assembler treats the trailing checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Reject corrupt telegrams, accept ones without a checksum
    #[default]
    Verify,
    /// Reject corrupt telegrams and ones without a checksum
    Require,
    /// Do not look at the checksum at all
    Skip,
}

impl std::str::FromStr for ChecksumPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "verify" => Ok(ChecksumPolicy::Verify),
            "require" => Ok(ChecksumPolicy::Require),
            "skip" | "off" => Ok(ChecksumPolicy::Skip),
            other => Err(format!("unknown checksum policy {:?}", other)),
        }
    }
}

/// CRC-16/ARC: init 0, LSB first, no final XOR
pub fn crc16_arc(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &b in bytes {
        crc ^= b as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC16_ARC_POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Parse the 4-digit hex field after `!`
pub fn parse_checksum(text: &str) -> Result<u16, ChecksumError> {
    let (_, digits) = all_consuming(hex_digit1::<&str, nom::error::Error<&str>>)
        .parse(text)
        .map_err(|_| ChecksumError::Invalid(text.to_string()))?;

    if digits.len() != CHECKSUM_DIGITS {
        return Err(ChecksumError::Invalid(text.to_string()));
    }
    u16::from_str_radix(digits, 16).map_err(|_| ChecksumError::Invalid(text.to_string()))
}

/// Check the telegram's declared CRC against its contents
pub fn validate(telegram: &Telegram) -> Result<(), ChecksumError> {
    let declared = telegram
        .declared_checksum()
        .ok_or(ChecksumError::Missing)?;
    let declared = parse_checksum(declared)?;
    let computed = crc16_arc(&telegram.crc_payload());

    if declared != computed {
        return Err(ChecksumError::Mismatch { declared, computed });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::fixtures::{sealed, DSMR5_CAPTURE};

    #[test]
    fn test_crc16_arc_check_value() {
        // Standard check value for CRC-16/ARC
        assert_eq!(crc16_arc(b"123456789"), 0xBB3D);
        assert_eq!(crc16_arc(b""), 0);
    }

    #[test]
    fn test_parse_checksum() {
        assert_eq!(parse_checksum("EF2F").unwrap(), 0xEF2F);
        assert_eq!(parse_checksum("00a1").unwrap(), 0x00A1);
        assert!(matches!(parse_checksum("EF2"), Err(ChecksumError::Invalid(_))));
        assert!(matches!(parse_checksum("EF2F0"), Err(ChecksumError::Invalid(_))));
        assert!(matches!(parse_checksum("XYZW"), Err(ChecksumError::Invalid(_))));
    }

    #[test]
    fn test_meter_capture_checksum() {
        let telegram = Telegram::from_lines(DSMR5_CAPTURE).unwrap();
        assert_eq!(telegram.declared_checksum(), Some("6EEE"));
        assert_eq!(crc16_arc(&telegram.crc_payload()), 0x6EEE);
        assert_eq!(validate(&telegram), Ok(()));

        // Same capture with one register digit changed
        let mut lines: Vec<&str> = DSMR5_CAPTURE.to_vec();
        lines[5] = "1-0:1.8.1(000004.427*kWh)";
        let telegram = Telegram::from_lines(&lines).unwrap();
        assert!(matches!(
            validate(&telegram),
            Err(ChecksumError::Mismatch { declared: 0x6EEE, .. })
        ));
    }

    #[test]
    fn test_valid_telegram() {
        let lines = sealed(&[
            "/ISk5\\2MT382-1000",
            "",
            "1-0:1.8.1(000123.456*kWh)",
            "1-0:1.8.2(000456.789*kWh)",
        ]);
        let telegram = Telegram::from_lines(&lines).unwrap();
        assert_eq!(validate(&telegram), Ok(()));
    }

    #[test]
    fn test_corrupted_telegram() {
        let mut lines = sealed(&["/ISk5\\2MT382-1000", "", "1-0:1.8.1(000123.456*kWh)"]);
        // One flipped digit on the line
        lines[2] = "1-0:1.8.1(000123.457*kWh)".to_string();
        let telegram = Telegram::from_lines(&lines).unwrap();
        assert!(matches!(
            validate(&telegram),
            Err(ChecksumError::Mismatch { .. })
        ));
    }

    #[test]
    fn test_dropped_line_detected() {
        let mut lines = sealed(&[
            "/ISk5\\2MT382-1000",
            "",
            "1-0:1.8.1(000123.456*kWh)",
            "1-0:1.8.2(000456.789*kWh)",
        ]);
        lines.remove(3);
        let telegram = Telegram::from_lines(&lines).unwrap();
        assert!(validate(&telegram).is_err());
    }

    #[test]
    fn test_missing_checksum() {
        let telegram = Telegram::from_lines(&["/KFM5KAIFA-METER", "1-0:1.8.1(1*kWh)", "!"]).unwrap();
        let err = validate(&telegram).unwrap_err();
        assert_eq!(err, ChecksumError::Missing);
        assert!(err.is_advisory());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("verify".parse::<ChecksumPolicy>(), Ok(ChecksumPolicy::Verify));
        assert_eq!("REQUIRE".parse::<ChecksumPolicy>(), Ok(ChecksumPolicy::Require));
        assert_eq!("off".parse::<ChecksumPolicy>(), Ok(ChecksumPolicy::Skip));
        assert!("maybe".parse::<ChecksumPolicy>().is_err());
    }
}
