use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use hanalink_transport::DeviceStream;
use tracing::{debug, trace, warn};

use crate::codec::{Frame, FrameConfig, FrameFilter};
use crate::crc::Crc8;
use crate::error::{FrameError, Result};
use crate::kind::RESPONSE;

const READ_CHUNK_SIZE: usize = 256;

/// Where the reader is inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    LookingForHeader,
    ExpectingSeqNo,
    ExpectingType,
    ExpectingLength,
    ReadingPayload,
    ExpectingChecksum,
    /// A header byte arrived mid-frame; the next byte is literal content
    /// for the carried field.
    Escaping(Field),
}

/// Escapable fields of a frame, i.e. the states an escape resumes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    SeqNo,
    Type,
    Length,
    Payload,
}

/// Counters for everything the reader has seen since it was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Frames handed to the caller.
    pub frames: u64,
    /// Frames dropped because the checksum did not match.
    pub checksum_errors: u64,
    /// Well-formed frames dropped by the [`FrameFilter`].
    pub skipped: u64,
}

/// Incremental frame parser. Feed it one byte at a time with [`push`].
///
/// One reader belongs to one connection. Corrupt frames are dropped (and
/// counted) rather than reported, so the read loop never has to stop.
///
/// [`push`]: FrameReader::push
#[derive(Debug)]
pub struct FrameReader {
    header: u8,
    filter: FrameFilter,
    state: ReadState,
    crc: Crc8,
    sequence_number: u8,
    frame_type: u8,
    remaining: u8,
    payload: BytesMut,
    stats: ReaderStats,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Reader for controller replies with the default header.
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    /// Reader that emits every well-formed frame, requests included.
    pub fn accepting_all() -> Self {
        Self::with_config(&FrameConfig {
            filter: FrameFilter::Any,
            ..FrameConfig::default()
        })
    }

    /// Reader with explicit header and filter.
    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            header: config.header,
            filter: config.filter,
            state: ReadState::LookingForHeader,
            crc: Crc8::new(),
            sequence_number: 0,
            frame_type: 0,
            remaining: 0,
            payload: BytesMut::new(),
            stats: ReaderStats::default(),
        }
    }

    /// Consume one byte; returns a frame when this byte completed one.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            ReadState::LookingForHeader => {
                if byte == self.header {
                    self.begin();
                } else {
                    trace!(byte, "discarding byte outside frame");
                }
                None
            }
            ReadState::ExpectingSeqNo => self.field_byte(Field::SeqNo, byte),
            ReadState::ExpectingType => self.field_byte(Field::Type, byte),
            ReadState::ExpectingLength => self.field_byte(Field::Length, byte),
            ReadState::ReadingPayload => self.field_byte(Field::Payload, byte),
            ReadState::Escaping(field) => self.accept(field, byte),
            ReadState::ExpectingChecksum => self.finish(byte),
        }
    }

    /// Consume a slice, collecting every frame it completes.
    pub fn push_slice(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&byte| self.push(byte)).collect()
    }

    /// Current parser state.
    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Counters since creation.
    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Abandon any partial frame.
    pub fn reset(&mut self) {
        self.state = ReadState::LookingForHeader;
        self.payload.clear();
    }

    fn begin(&mut self) {
        self.crc = Crc8::new();
        self.sequence_number = 0;
        self.frame_type = 0;
        self.remaining = 0;
        self.payload.clear();
        self.state = ReadState::ExpectingSeqNo;
    }

    fn field_byte(&mut self, field: Field, byte: u8) -> Option<Frame> {
        if byte == self.header {
            self.state = ReadState::Escaping(field);
            return None;
        }
        self.accept(field, byte)
    }

    fn accept(&mut self, field: Field, byte: u8) -> Option<Frame> {
        self.crc.update(byte);
        self.state = match field {
            Field::SeqNo => {
                self.sequence_number = byte;
                ReadState::ExpectingType
            }
            Field::Type => {
                self.frame_type = byte;
                ReadState::ExpectingLength
            }
            Field::Length => {
                self.remaining = byte;
                self.payload.reserve(byte as usize);
                if byte == 0 {
                    ReadState::ExpectingChecksum
                } else {
                    ReadState::ReadingPayload
                }
            }
            Field::Payload => {
                self.payload.extend_from_slice(&[byte]);
                self.remaining -= 1;
                if self.remaining == 0 {
                    ReadState::ExpectingChecksum
                } else {
                    ReadState::ReadingPayload
                }
            }
        };
        None
    }

    fn finish(&mut self, received: u8) -> Option<Frame> {
        let expected = self.crc.finalize();
        self.state = ReadState::LookingForHeader;
        let frame = Frame {
            sequence_number: self.sequence_number,
            frame_type: self.frame_type,
            payload: self.payload.split().freeze(),
        };

        if expected != received {
            self.stats.checksum_errors += 1;
            warn!(
                seq = frame.sequence_number,
                frame_type = frame.frame_type,
                len = frame.payload.len(),
                expected,
                actual = received,
                "checksum mismatch; dropping frame"
            );
            return None;
        }

        if self.filter == FrameFilter::Responses && frame.frame_type != RESPONSE {
            self.stats.skipped += 1;
            debug!(
                seq = frame.sequence_number,
                frame_type = frame.frame_type,
                "skipping non-response frame"
            );
            return None;
        }

        self.stats.frames += 1;
        debug!(
            seq = frame.sequence_number,
            frame_type = frame.frame_type,
            len = frame.payload.len(),
            "frame received"
        );
        Some(frame)
    }
}

/// Reads complete frames from any `Read` stream.
///
/// Partial reads are buffered internally; callers always get complete frames.
pub struct FrameStream<T> {
    inner: T,
    buf: BytesMut,
    reader: FrameReader,
}

impl<T: Read> FrameStream<T> {
    /// Create a new frame stream with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, &FrameConfig::default())
    }

    /// Create a new frame stream with explicit configuration.
    pub fn with_config(inner: T, config: &FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            reader: FrameReader::with_config(config),
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. A
    /// read timeout surfaces as `FrameError::Io` with the partial frame kept,
    /// so the call can simply be retried.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            while self.buf.has_remaining() {
                let byte = self.buf.get_u8();
                if let Some(frame) = self.reader.push(byte) {
                    return Ok(frame);
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the frame parser (state and counters).
    pub fn reader(&self) -> &FrameReader {
        &self.reader
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the stream and return the inner reader.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameStream<DeviceStream> {
    /// Create a frame stream for `DeviceStream` and apply read timeout from config.
    pub fn with_config_device(mut inner: DeviceStream, config: &FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: hanalink_transport::TransportError) -> FrameError {
    match err {
        hanalink_transport::TransportError::Io(io)
        | hanalink_transport::TransportError::Connect { source: io, .. } => FrameError::Io(io),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
