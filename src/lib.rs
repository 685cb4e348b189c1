// p1-meter: reads DSMR smart meter telegrams from the P1 port
// and turns them into structured readings

pub mod config;
pub mod dialect;
pub mod logging;
pub mod reading;
pub mod serial;
pub mod service;
pub mod telegram;

// Re-export commonly used types
pub use config::{ConfigError, MeterConfig, OutputFormat};
pub use dialect::{
    detect_dialect, get_dialect, list_dialects, register_dialect, Dialect, DialectSelection,
    FieldRule, Value,
};
pub use reading::{
    channel, ChannelSink, InfluxLineSink, JsonLinesSink, Reading, ReadingAssembler, Sink,
};
pub use serial::{ByteSource, ReplaySource, SerialConfig, SerialPort, TransportError};
pub use service::{LoopStats, MeterService, ServiceError, Step};
pub use telegram::{ChecksumPolicy, FramerConfig, Telegram, TelegramFramer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
