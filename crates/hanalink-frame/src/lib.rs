//! Framing for the Hanazeder FP serial protocol.
//!
//! Every message on the wire is framed as:
//! - A 1-byte header (`0xEE`) for stream synchronization
//! - A sequence number, a message type and a 1-byte payload length
//! - The payload itself
//! - A CRC-8/MAXIM checksum over everything between header and checksum
//!
//! Header-valued bytes between the header and the checksum are doubled on
//! the wire. [`FrameReader`] undoes this one byte at a time, so callers can
//! feed it whatever their transport hands them.

pub mod codec;
pub mod crc;
pub mod error;
pub mod kind;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use codec::{
    decode_scaled_number, encode_message, encode_request, header_from_bytes, Frame, FrameConfig,
    FrameFilter, HEADER, MAX_PAYLOAD, SENSOR_ABSENT,
};
pub use crc::{crc8_maxim, Crc8};
pub use error::{FrameError, Result};
pub use kind::{
    type_name, READ_CONFIG_BLOCK, READ_DEBUG_BLOCK, READ_INFORMATION, READ_SENSOR,
    READ_SENSOR_NAME, RESPONSE,
};
pub use reader::{Field, FrameReader, FrameStream, ReadState, ReaderStats};
pub use writer::MessageWriter;

#[cfg(feature = "async")]
pub use tokio_codec::{HanaCodec, OutboundMessage};
