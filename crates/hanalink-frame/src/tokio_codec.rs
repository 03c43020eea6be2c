//! `tokio_util::codec` adapter for async transports.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_message, Frame, FrameConfig};
use crate::error::FrameError;
use crate::reader::FrameReader;

/// A request ready for encoding: sequence number plus `type | len | payload`.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub sequence_number: u8,
    pub body: Bytes,
}

impl OutboundMessage {
    pub fn new(sequence_number: u8, body: impl Into<Bytes>) -> Self {
        Self {
            sequence_number,
            body: body.into(),
        }
    }
}

/// Codec pairing the incremental [`FrameReader`] with the message encoder.
#[derive(Debug)]
pub struct HanaCodec {
    header: u8,
    reader: FrameReader,
}

impl HanaCodec {
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            header: config.header,
            reader: FrameReader::with_config(config),
        }
    }

    /// Borrow the frame parser (state and counters).
    pub fn reader(&self) -> &FrameReader {
        &self.reader
    }
}

impl Default for HanaCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for HanaCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        // Bytes are consumed as they are parsed; partial frames live in the reader.
        while src.has_remaining() {
            let byte = src.get_u8();
            if let Some(frame) = self.reader.push(byte) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

impl Encoder<OutboundMessage> for HanaCodec {
    type Error = FrameError;

    fn encode(&mut self, item: OutboundMessage, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_message(self.header, item.sequence_number, &item.body, dst)
    }
}
