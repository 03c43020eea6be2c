use bytes::{BufMut, Bytes, BytesMut};

use crate::crc::Crc8;
use crate::error::{FrameError, Result};
use crate::kind::RESPONSE;

/// Header byte that starts every frame.
pub const HEADER: u8 = 0xEE;

/// Largest payload a 1-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Reading reported for a sensor input with nothing connected (0x7FFF LE).
pub const SENSOR_ABSENT: [u8; 2] = [0xFF, 0x7F];

/// A complete, checksum-validated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number correlating a reply with its request.
    pub sequence_number: u8,
    /// Message type (operation code for requests, `0xF0` for replies).
    pub frame_type: u8,
    /// The message payload, header escaping already removed.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(sequence_number: u8, frame_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence_number,
            frame_type,
            payload: payload.into(),
        }
    }

    /// Returns true if this frame is a controller reply.
    pub fn is_response(&self) -> bool {
        self.frame_type == RESPONSE
    }

    /// Encode this frame into the wire format using `header`.
    pub fn encode(&self, header: u8, dst: &mut BytesMut) -> Result<()> {
        encode_request(
            header,
            self.sequence_number,
            self.frame_type,
            &self.payload,
            dst,
        )
    }
}

/// Encode a message into the wire format.
///
/// `body` is everything after the sequence number and before the checksum:
/// type byte, length byte, then exactly `length` payload bytes.
///
/// Wire format:
/// ```text
/// ┌────────┬─────┬──────┬─────┬─────────────────┬───────┐
/// │ Header │ Seq │ Type │ Len │ Payload         │ CRC-8 │
/// │ 0xEE   │ 1B  │ 1B   │ 1B  │ (Len bytes)     │ 1B    │
/// └────────┴─────┴──────┴─────┴─────────────────┴───────┘
///           └──── header bytes doubled ─────────┘
/// ```
///
/// The checksum covers the unescaped `Seq..Payload` region and is itself
/// never escaped.
pub fn encode_message(
    header: u8,
    sequence_number: u8,
    body: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    validate_body(body)?;

    let mut crc = Crc8::new();
    // Worst case every byte of the region is doubled.
    dst.reserve(2 + 2 * (1 + body.len()));
    dst.put_u8(header);
    for &byte in std::iter::once(&sequence_number).chain(body) {
        crc.update(byte);
        dst.put_u8(byte);
        if byte == header {
            dst.put_u8(byte);
        }
    }
    dst.put_u8(crc.finalize());
    Ok(())
}

/// Encode a message from its parts, filling in the length byte.
pub fn encode_request(
    header: u8,
    sequence_number: u8,
    message_type: u8,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    let mut body = Vec::with_capacity(2 + payload.len());
    body.push(message_type);
    body.push(payload.len() as u8);
    body.extend_from_slice(payload);
    encode_message(header, sequence_number, &body, dst)
}

fn validate_body(body: &[u8]) -> Result<()> {
    let [_, declared, payload @ ..] = body else {
        return Err(FrameError::InvalidArgument(format!(
            "message body must start with type and length bytes (got {} bytes)",
            body.len()
        )));
    };
    if payload.len() != *declared as usize {
        return Err(FrameError::InvalidArgument(format!(
            "length byte says {declared} payload bytes but {} follow",
            payload.len()
        )));
    }
    Ok(())
}

/// Validate a header given as raw bytes. Only single-byte headers exist.
pub fn header_from_bytes(bytes: &[u8]) -> Result<u8> {
    match bytes {
        [header] => Ok(*header),
        _ => Err(FrameError::InvalidArgument(format!(
            "header must be a single byte (got {} bytes)",
            bytes.len()
        ))),
    }
}

/// Decode a two-byte little-endian fixed-point reading (one decimal place).
///
/// Returns `Ok(None)` for [`SENSOR_ABSENT`]. Readings are signed on every
/// known controller; `signed = false` exists for counters that are not.
pub fn decode_scaled_number(bytes: &[u8], signed: bool) -> Result<Option<f64>> {
    let raw: [u8; 2] = bytes.try_into().map_err(|_| {
        FrameError::InvalidArgument(format!(
            "scaled number needs exactly 2 bytes (got {})",
            bytes.len()
        ))
    })?;
    if raw == SENSOR_ABSENT {
        return Ok(None);
    }
    let value = if signed {
        f64::from(i16::from_le_bytes(raw))
    } else {
        f64::from(u16::from_le_bytes(raw))
    };
    Ok(Some(value / 10.0))
}

/// Which well-formed frames a [`crate::FrameReader`] hands out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameFilter {
    /// Only controller replies. Requests seen on the line (a half-duplex
    /// adapter echoing our own writes) are skipped.
    #[default]
    Responses,
    /// Every frame, whatever its type.
    Any,
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Header byte. Default: `0xEE`.
    pub header: u8,
    /// Which frames the reader emits. Default: responses only.
    pub filter: FrameFilter,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            header: HEADER,
            filter: FrameFilter::Responses,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc8_maxim;

    fn encode(seq: u8, body: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_message(HEADER, seq, body, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn encodes_captured_requests() {
        assert_eq!(encode(0, &[0x01, 0x00]), [0xEE, 0x00, 0x01, 0x00, 0xC4]);
        assert_eq!(
            encode(1, &[0x04, 0x01, 0x00]),
            [0xEE, 0x01, 0x04, 0x01, 0x00, 0xD5]
        );
        assert_eq!(
            encode(16, &[0x20, 0x03, 0x3F, 0x01, 0x03]),
            [0xEE, 0x10, 0x20, 0x03, 0x3F, 0x01, 0x03, 0x8C]
        );
    }

    #[test]
    fn header_bytes_are_doubled_and_checksum_uses_logical_bytes() {
        let wire = encode(2, &[0xF0, 0x02, 0xEE, 0x01]);
        let crc = crc8_maxim(&[0x02, 0xF0, 0x02, 0xEE, 0x01]);
        assert_eq!(wire, [0xEE, 0x02, 0xF0, 0x02, 0xEE, 0xEE, 0x01, crc]);
    }

    #[test]
    fn header_valued_sequence_number_is_escaped() {
        let wire = encode(0xEE, &[0x01, 0x00]);
        assert_eq!(&wire[..3], &[0xEE, 0xEE, 0xEE]);
        assert_eq!(wire.len(), 6);
    }

    #[test]
    fn checksum_byte_is_never_escaped() {
        // CRC over 00 F0 01 68 is 0xEE.
        let wire = encode(0, &[0xF0, 0x01, 0x68]);
        assert_eq!(wire, [0xEE, 0x00, 0xF0, 0x01, 0x68, 0xEE]);
    }

    #[test]
    fn encode_request_fills_length() {
        let mut buf = BytesMut::new();
        encode_request(HEADER, 1, 0x04, &[0x00], &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0xEE, 0x01, 0x04, 0x01, 0x00, 0xD5]);
    }

    #[test]
    fn encode_request_rejects_oversized_payload() {
        let mut buf = BytesMut::new();
        let err = encode_request(HEADER, 1, 0x04, &[0u8; 256], &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 256, max: 255 }));
    }

    #[test]
    fn rejects_body_without_type_and_length() {
        let mut buf = BytesMut::new();
        let err = encode_message(HEADER, 0, &[0x01], &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::InvalidArgument(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_body_with_wrong_length_byte() {
        let mut buf = BytesMut::new();
        let err = encode_message(HEADER, 0, &[0x04, 0x02, 0x00], &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::InvalidArgument(_)));
    }

    #[test]
    fn header_must_be_single_byte() {
        assert_eq!(header_from_bytes(&[0xEE]).unwrap(), 0xEE);
        assert!(matches!(
            header_from_bytes(&[]),
            Err(FrameError::InvalidArgument(_))
        ));
        assert!(matches!(
            header_from_bytes(&[0xEE, 0xEE]),
            Err(FrameError::InvalidArgument(_))
        ));
    }

    #[test]
    fn decodes_sensor_reading() {
        assert_eq!(decode_scaled_number(&[0x55, 0x01], true).unwrap(), Some(34.1));
    }

    #[test]
    fn decodes_absent_sensor() {
        assert_eq!(decode_scaled_number(&[0xFF, 0x7F], true).unwrap(), None);
        assert_eq!(decode_scaled_number(&[0xFF, 0x7F], false).unwrap(), None);
    }

    #[test]
    fn decodes_negative_and_unsigned() {
        // 0xFF9C = -100 signed, 65436 unsigned.
        assert_eq!(decode_scaled_number(&[0x9C, 0xFF], true).unwrap(), Some(-10.0));
        assert_eq!(
            decode_scaled_number(&[0x9C, 0xFF], false).unwrap(),
            Some(6543.6)
        );
    }

    #[test]
    fn scaled_number_needs_two_bytes() {
        assert!(decode_scaled_number(&[0x55], true).is_err());
        assert!(decode_scaled_number(&[0x55, 0x01, 0x00], true).is_err());
    }

    #[test]
    fn frame_encode_matches_encode_request() {
        let frame = Frame::new(3, RESPONSE, vec![0x55, 0x01]);
        let mut buf = BytesMut::new();
        frame.encode(HEADER, &mut buf).unwrap();
        assert_eq!(
            buf.as_ref(),
            &[0xEE, 0x03, 0xF0, 0x02, 0x55, 0x01, 0xA6]
        );
        assert!(frame.is_response());
    }
}
