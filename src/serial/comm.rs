// Serial port access for the meter's P1 port
// Wraps the serialport crate with tokio timeouts

use std::io::{self, Read};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    Port(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Port not open")]
    NotOpen,

    #[error("Source exhausted")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// True for errors that end the stream for good (no retry makes sense)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportError::Closed | TransportError::NotOpen)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Upper bound for a single line; P1 lines are well under 1 KiB
const MAX_LINE_BYTES: usize = 2048;

/// Serial port configuration
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate (9600 for DSMR 2.2, 115200 for DSMR 4 and later)
    pub baud_rate: u32,

    /// Data bits (7 or 8)
    pub data_bits: serialport::DataBits,

    /// Stop bits
    pub stop_bits: serialport::StopBits,

    /// Parity
    pub parity: serialport::Parity,

    /// Flow control
    pub flow_control: serialport::FlowControl,

    /// Read timeout for a single line
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            data_bits: serialport::DataBits::Seven,
            stop_bits: serialport::StopBits::One,
            parity: serialport::Parity::Even,
            flow_control: serialport::FlowControl::None,
            timeout: Duration::from_secs(20),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with specified baud rate
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Default::default()
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Switch to 8N1 framing (most DSMR 4/5 meters)
    pub fn with_8n1(mut self) -> Self {
        self.data_bits = serialport::DataBits::Eight;
        self.parity = serialport::Parity::None;
        self
    }
}

/// Line-oriented serial port wrapper
pub struct SerialPort {
    port: Option<Box<dyn serialport::SerialPort>>,
    config: SerialConfig,
    port_name: String,
    // Bytes of a line that was cut short by a timeout
    pending: Vec<u8>,
}

impl SerialPort {
    /// Open a serial port with the given configuration
    pub fn open(port_name: &str, config: SerialConfig) -> Result<Self> {
        let mut port = serialport::new(port_name, config.baud_rate)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .parity(config.parity)
            .flow_control(config.flow_control)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| TransportError::Port(e.to_string()))?;

        // Cables without a dedicated request pin wire P1 "data request" to DTR/RTS
        let _ = port.write_data_terminal_ready(true);
        let _ = port.write_request_to_send(true);

        tracing::info!(
            "Opened {} at {} baud ({:?}, {:?})",
            port_name,
            config.baud_rate,
            config.data_bits,
            config.parity
        );

        Ok(Self {
            port: Some(port),
            config,
            port_name: port_name.to_string(),
            pending: Vec::new(),
        })
    }

    /// Get the port name
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Get the configuration
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Read one line, stripped of its CR/LF terminator.
    ///
    /// Bytes received before a timeout are kept and prefixed to the next
    /// successful read, so a slow line is never split in two.
    pub async fn read_line(&mut self, limit: Duration) -> Result<String> {
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        let pending = &mut self.pending;

        let line = timeout(limit, async {
            let mut byte = [0u8; 1];
            loop {
                match port.read(&mut byte) {
                    Ok(0) => {
                        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "Port closed"))
                    }
                    Ok(_) => {
                        if byte[0] == b'\n' {
                            return Ok(std::mem::take(pending));
                        }
                        pending.push(byte[0]);
                        if pending.len() > MAX_LINE_BYTES {
                            pending.clear();
                            return Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                "Line exceeds maximum length",
                            ));
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
        .await
        .map_err(|_| TransportError::Timeout(limit))?
        .map_err(TransportError::Io)?;

        Ok(decode_line_bytes(&line))
    }

    /// Clear input buffer
    pub fn clear_input(&mut self) -> Result<()> {
        self.pending.clear();
        let port = self.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.clear(serialport::ClearBuffer::Input)
            .map_err(|e| TransportError::Port(e.to_string()))
    }

    /// Close the port
    pub fn close(mut self) -> Result<()> {
        self.port.take();
        Ok(())
    }
}

/// Turn raw line bytes into text without the trailing CR.
///
/// P1 is 7-bit ASCII; anything else is replaced rather than rejected so the
/// checksum check gets to decide whether the telegram is usable.
pub fn decode_line_bytes(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_end_matches(['\r', '\n']).to_string()
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<String>> {
    serialport::available_ports()
        .map_err(|e| TransportError::Port(e.to_string()))?
        .into_iter()
        .map(|p| Ok(p.port_name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.data_bits, serialport::DataBits::Seven);
        assert_eq!(config.parity, serialport::Parity::Even);

        let config = SerialConfig::new(9600)
            .with_timeout(Duration::from_secs(5))
            .with_8n1();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.data_bits, serialport::DataBits::Eight);
        assert_eq!(config.parity, serialport::Parity::None);
    }

    #[test]
    fn test_decode_line_bytes() {
        assert_eq!(decode_line_bytes(b"1-0:1.8.1(000123.456*kWh)\r"), "1-0:1.8.1(000123.456*kWh)");
        assert_eq!(decode_line_bytes(b"\r"), "");
        // Interior whitespace belongs to the telegram and is kept
        assert_eq!(decode_line_bytes(b" (00001.000) \r"), " (00001.000) ");
    }

    #[test]
    fn test_terminal_errors() {
        assert!(TransportError::Closed.is_terminal());
        assert!(!TransportError::Timeout(Duration::from_secs(1)).is_terminal());
    }

    #[test]
    fn test_list_ports() {
        // This should not fail even if no ports are available
        let result = list_ports();
        assert!(result.is_ok());
    }
}
