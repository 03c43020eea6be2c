//! Message type codes.
//!
//! Requests carry an operation code in the type byte; every reply from the
//! controller carries [`RESPONSE`] instead.

/// Device information (type, platform, firmware version).
pub const READ_INFORMATION: u8 = 0x01;

/// Current value of one sensor input.
pub const READ_SENSOR: u8 = 0x04;

/// Block of configuration entries.
pub const READ_CONFIG_BLOCK: u8 = 0x07;

/// Label code and name of one sensor input.
pub const READ_SENSOR_NAME: u8 = 0x13;

/// Block of raw debug memory (energy counters live here).
pub const READ_DEBUG_BLOCK: u8 = 0x20;

/// Type byte of every controller reply.
pub const RESPONSE: u8 = 0xF0;

/// Returns a human-readable name for a message type.
pub fn type_name(kind: u8) -> &'static str {
    match kind {
        READ_INFORMATION => "READ_INFORMATION",
        READ_SENSOR => "READ_SENSOR",
        READ_CONFIG_BLOCK => "READ_CONFIG_BLOCK",
        READ_SENSOR_NAME => "READ_SENSOR_NAME",
        READ_DEBUG_BLOCK => "READ_DEBUG_BLOCK",
        RESPONSE => "RESPONSE",
        _ => "UNKNOWN",
    }
}
