// Serial line acquisition for the P1 port
pub mod comm;
pub mod source;

#[cfg(test)]
pub mod mock;

pub use comm::{list_ports, SerialConfig, SerialPort, TransportError};
pub use source::{ByteSource, ReplaySource};
