// Raw telegram as cut from the line stream
// Reference: smart_meter.py lines 70-89 (get_next_message)

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // "/" + 3-letter manufacturer + baud digit + optional "\d" + model
    static ref IDENT_RE: Regex =
        Regex::new(r"^/([A-Za-z]{3})(\d)(?:\\\d)?(.*)$").expect("identification pattern");
}

/// One line from the stream with its position in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub seq: u64,
    pub content: String,
}

impl RawLine {
    pub fn new(seq: u64, content: impl Into<String>) -> Self {
        Self {
            seq,
            content: content.into(),
        }
    }
}

/// Meter identification from the header line, e.g. `/ISk5\2MT382-1000`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    /// Three-letter FLAG manufacturer code ("ISk", "KFM", "XMX")
    pub manufacturer: String,
    /// Baud rate indicator digit
    pub baud_indicator: char,
    pub model: String,
}

impl Identification {
    pub fn parse(header: &str) -> Option<Self> {
        let start = header.find('/')?;
        let caps = IDENT_RE.captures(&header[start..])?;
        Some(Self {
            manufacturer: caps[1].to_string(),
            baud_indicator: caps[2].chars().next()?,
            model: caps[3].trim().to_string(),
        })
    }
}

/// A complete telegram: header line through the `!` end line.
///
/// Only the framer (or `from_lines`) builds one, so the first line is always
/// a start marker and the last line always begins with `!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telegram {
    lines: Vec<RawLine>,
}

impl Telegram {
    pub(crate) fn new(lines: Vec<RawLine>) -> Self {
        debug_assert!(lines.len() >= 2);
        Self { lines }
    }

    /// Build a telegram from plain lines; the last line must be the end marker
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Option<Self> {
        if lines.len() < 2 || !lines[lines.len() - 1].as_ref().starts_with('!') {
            return None;
        }
        let raw = lines
            .iter()
            .enumerate()
            .map(|(i, l)| RawLine::new(i as u64, l.as_ref()))
            .collect();
        Some(Self::new(raw))
    }

    pub fn lines(&self) -> &[RawLine] {
        &self.lines
    }

    pub fn header(&self) -> &str {
        &self.lines[0].content
    }

    pub fn end_line(&self) -> &str {
        &self.lines[self.lines.len() - 1].content
    }

    /// Lines strictly between header and end marker
    pub fn body(&self) -> impl Iterator<Item = &str> {
        self.lines[1..self.lines.len() - 1]
            .iter()
            .map(|l| l.content.as_str())
    }

    /// Body lines that carry data (blank separator lines skipped)
    pub fn data_lines(&self) -> usize {
        self.body().filter(|l| !l.trim().is_empty()).count()
    }

    /// Text after `!`, if the meter sent one
    pub fn declared_checksum(&self) -> Option<&str> {
        let text = self.end_line()[1..].trim();
        (!text.is_empty()).then_some(text)
    }

    pub fn identification(&self) -> Option<Identification> {
        Identification::parse(self.header())
    }

    /// Bytes covered by the CRC: from `/` through `!`, CRLF after every
    /// line, checksum digits excluded
    pub fn crc_payload(&self) -> Vec<u8> {
        let header = self.header();
        let header = header.find('/').map_or(header, |i| &header[i..]);

        let mut bytes = Vec::with_capacity(self.lines.len() * 32);
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        for line in &self.lines[1..self.lines.len() - 1] {
            bytes.extend_from_slice(line.content.as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }
        bytes.push(b'!');
        bytes
    }

    /// Sequence number of the first line
    pub fn first_seq(&self) -> u64 {
        self.lines[0].seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identification() {
        let ident = Identification::parse("/ISk5\\2MT382-1000").unwrap();
        assert_eq!(ident.manufacturer, "ISk");
        assert_eq!(ident.baud_indicator, '5');
        assert_eq!(ident.model, "MT382-1000");

        let ident = Identification::parse("/KFM5KAIFA-METER").unwrap();
        assert_eq!(ident.manufacturer, "KFM");
        assert_eq!(ident.model, "KAIFA-METER");

        // Line noise before the marker is tolerated
        let ident = Identification::parse("\u{0}\u{7f}/XMX5LGBBFG1009021021").unwrap();
        assert_eq!(ident.manufacturer, "XMX");

        assert!(Identification::parse("1-0:1.8.1(000123.456*kWh)").is_none());
    }

    #[test]
    fn test_from_lines() {
        let t = Telegram::from_lines(&["/ISk5\\2MT382-1000", "", "1-0:1.8.1(1*kWh)", "!1234"])
            .unwrap();
        assert_eq!(t.header(), "/ISk5\\2MT382-1000");
        assert_eq!(t.body().count(), 2);
        assert_eq!(t.data_lines(), 1);
        assert_eq!(t.declared_checksum(), Some("1234"));

        assert!(Telegram::from_lines(&["/ISk5\\2MT382-1000"]).is_none());
        assert!(Telegram::from_lines(&["/ISk5\\2MT382-1000", "1-0:1.8.1(1*kWh)"]).is_none());
    }

    #[test]
    fn test_missing_checksum() {
        let t = Telegram::from_lines(&["/KFM5KAIFA-METER", "!"]).unwrap();
        assert_eq!(t.declared_checksum(), None);
        assert_eq!(t.body().count(), 0);
    }

    #[test]
    fn test_crc_payload() {
        let t = Telegram::from_lines(&["xx/ABC5X", "", "1-0:1.8.1(1*kWh)", "!BEEF"]).unwrap();
        assert_eq!(t.crc_payload(), b"/ABC5X\r\n\r\n1-0:1.8.1(1*kWh)\r\n!".to_vec());
    }
}
