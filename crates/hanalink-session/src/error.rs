use std::time::Duration;

/// Why a reply could not be turned into the value its request asked for.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The reply payload is shorter than the operation requires.
    #[error("reply truncated ({actual} bytes, need {expected})")]
    Truncated { expected: usize, actual: usize },

    /// A field holds a value the operation does not know.
    #[error("invalid reply: {0}")]
    Invalid(String),

    /// A payload field failed frame-level decoding.
    #[error(transparent)]
    Frame(#[from] hanalink_frame::FrameError),
}

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] hanalink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] hanalink_frame::FrameError),

    /// The link to the device was lost (or had already been lost).
    #[error("not connected to device")]
    NotConnected,

    /// The session was shut down before the request completed.
    #[error("session shut down")]
    ShutDown,

    /// The request was resent the configured number of times without reply.
    #[error("request {sequence_number} timed out after {elapsed:?}")]
    RequestTimeout {
        sequence_number: u8,
        elapsed: Duration,
    },

    /// Another request is still waiting on this sequence number.
    #[error("sequence number {0} is still in flight")]
    SequenceInUse(u8),

    /// No free sequence number (or the configured limit was reached).
    #[error("too many requests in flight (limit {0})")]
    TooManyInFlight(usize),

    /// The reply arrived but could not be decoded.
    #[error("could not decode reply to request {sequence_number}: {source}")]
    Decode {
        sequence_number: u8,
        #[source]
        source: DecodeError,
    },
}

pub type Result<T> = std::result::Result<T, SessionError>;
