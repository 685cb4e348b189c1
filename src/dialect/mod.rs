// Vendor dialects: OBIS field tables and line decoding
pub mod decode;
pub mod registry;
pub mod rules;

pub use decode::{decode_line, parse_timestamp, DecodeError};
pub use registry::{
    detect_dialect, get_dialect, list_dialects, register_dialect, Dialect, DialectError,
    DialectSelection,
};
pub use rules::{Extraction, FieldRule, Value, ValueType};
