//! Error types for WebSocket connections.
//!
//! This module defines every error condition surfaced by the handshake, the
//! frame codec and live connections.

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid upgrade request or failed 101 response.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The response sink cannot hand over the raw stream.
    #[error("Response sink does not support connection takeover")]
    NotHijackable,

    /// The HTTP layer failed to hand over the raw stream.
    #[error("Failed to take over connection: {0}")]
    Hijack(String),

    /// Incomplete frame data. Not fatal: read more bytes and decode again.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Frame can never fit in the receive buffer.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Declared frame size, header included.
        size: usize,
        /// Receive buffer capacity.
        max: usize,
    },

    /// Connection has been closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A liveness check is already outstanding on this connection.
    #[error("check_alive() already running")]
    CheckAliveRunning,

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Returns `true` for the codec's "need more data" status.
    #[inline]
    #[must_use]
    pub const fn is_incomplete(&self) -> bool {
        matches!(self, Error::IncompleteFrame { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
