//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering every wire-level failure mode.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The received bytes are not valid UTF-8.
    #[error("invalid UTF-8 in message: {0}")]
    Decode(String),

    /// The peer accepted zero bytes for a non-empty write.
    #[error("write returned zero after {written} of {total} bytes")]
    WriteZero {
        /// Bytes flushed before the zero-length write.
        written: usize,
        /// Total payload length.
        total: usize,
    },

    /// The peer kept reporting would-block for longer than the write policy allows.
    #[error("write stalled after {written} of {total} bytes ({stalls} consecutive stalls)")]
    Stalled {
        /// Bytes flushed before giving up.
        written: usize,
        /// Total payload length.
        total: usize,
        /// Consecutive would-block results observed.
        stalls: u32,
    },

    /// Connection was closed by the peer.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<std::str::Utf8Error> for ProtocolError {
    fn from(err: std::str::Utf8Error) -> Self {
        ProtocolError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed(err.to_string()),
            _ => ProtocolError::Io(err.to_string()),
        }
    }
}
