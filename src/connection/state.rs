//! WebSocket connection lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};

/// WebSocket connection state.
///
/// A connection starts `Open` once the handshake has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Connection is open and ready for data transfer.
    #[default]
    Open,
    /// Close frame sent by `shutdown`, stream not yet closed.
    Closing,
    /// Connection is fully closed.
    Closed,
}

impl ConnectionState {
    /// Check if the connection is in an active state.
    ///
    /// Returns `true` for `Open` or `Closing` states.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }

    /// Check if sending data is allowed in this state.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    const fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Open => 0,
            ConnectionState::Closing => 1,
            ConnectionState::Closed => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Lock-free cell shared between the read loop and application tasks.
#[derive(Debug, Default)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `Open` to `Closing`. Returns `false` if the connection was not open.
    pub(crate) fn begin_closing(&self) -> bool {
        self.0
            .compare_exchange(
                ConnectionState::Open.as_u8(),
                ConnectionState::Closing.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Mark the connection closed. Returns `false` if it already was.
    pub(crate) fn close(&self) -> bool {
        self.0.swap(ConnectionState::Closed.as_u8(), Ordering::AcqRel)
            != ConnectionState::Closed.as_u8()
    }
}
