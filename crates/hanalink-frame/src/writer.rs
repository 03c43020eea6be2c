use std::io::{ErrorKind, Write};

use bytes::{Bytes, BytesMut};
use hanalink_transport::DeviceStream;
use tracing::trace;

use crate::codec::{encode_message, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 64;

/// Writes complete messages to any `Write` stream.
///
/// Each message goes out as one unit followed by a flush; the controller
/// answers nothing until it has seen the checksum byte.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    header: u8,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, &FrameConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: &FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            header: config.header,
        }
    }

    /// Encode `body` under `sequence_number`, send it, and return the exact
    /// bytes that went on the wire (kept by callers for resending).
    pub fn send(&mut self, sequence_number: u8, body: &[u8]) -> Result<Bytes> {
        self.buf.clear();
        encode_message(self.header, sequence_number, body, &mut self.buf)?;
        let encoded = self.buf.split().freeze();
        self.write_encoded(&encoded)?;
        Ok(encoded)
    }

    /// Write an already encoded message (blocking).
    ///
    /// Only `Interrupted` is retried. An expired write timeout surfaces as
    /// `WouldBlock` or `TimedOut` and is returned as [`FrameError::Io`].
    pub fn write_encoded(&mut self, encoded: &[u8]) -> Result<()> {
        trace!(len = encoded.len(), "writing message");
        let mut offset = 0usize;
        while offset < encoded.len() {
            match self.inner.write(&encoded[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Header byte this writer frames with.
    pub fn header(&self) -> u8 {
        self.header
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl MessageWriter<DeviceStream> {
    /// Create a message writer for `DeviceStream` and apply write timeout from config.
    pub fn with_config_device(inner: DeviceStream, config: &FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
