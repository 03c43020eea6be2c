//! Client library for Hanazeder FP solar and heating controllers.
//!
//! The controllers speak a small request/response protocol over RS-232
//! (38400 8N1), usually reached directly or through a TCP serial bridge.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and serial links behind one stream type
//! - [`frame`]: byte-stuffed, CRC-8 checked message framing
//! - [`session`]: request numbering, reply matching, resends and the
//!   controller's operations (behind the default `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use hanalink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hanalink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use hanalink_session::*;
}
