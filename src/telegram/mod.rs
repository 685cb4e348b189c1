// Telegram framing and integrity checking
pub mod checksum;
pub mod framer;
pub mod raw;

#[cfg(test)]
pub mod fixtures;

pub use checksum::{crc16_arc, validate, ChecksumError, ChecksumPolicy};
pub use framer::{FramerConfig, FramerState, FramingError, TelegramFramer};
pub use raw::{Identification, RawLine, Telegram};
