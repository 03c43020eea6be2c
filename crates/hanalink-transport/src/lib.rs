//! Byte-stream transports for Hanazeder FP controllers.
//!
//! The controllers speak the same protocol over two physical links:
//! - RS-232 (38400 baud, 8N1), usually through a USB adapter
//! - TCP, via a serial-to-ethernet bridge
//!
//! This is the lowest layer of hanalink. Everything else builds on top of
//! the [`DeviceStream`] type provided here.

pub mod error;
pub mod serial;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use serial::{SerialConfig, SerialTransport, DEFAULT_BAUD_RATE};
pub use stream::DeviceStream;
pub use tcp::TcpTransport;
