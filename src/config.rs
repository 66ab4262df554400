//! Configuration for WebSocket connections.

use std::time::Duration;

/// WebSocket connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Receive buffer capacity of the read loop (in bytes).
    ///
    /// A frame that cannot fit in this buffer tears the connection down.
    ///
    /// Default: 1 MB (1024 * 1024)
    pub read_buffer_size: usize,

    /// Capacity of each subscriber channel.
    ///
    /// When a subscriber's channel is full the read loop waits for it to
    /// drain, which pauses frame processing for the whole connection.
    ///
    /// Default: 1
    pub subscriber_capacity: usize,

    /// Time box for discarding bytes left over after the HTTP layer hands
    /// over the stream.
    ///
    /// Default: 1 ms
    pub drain_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024 * 1024,
            subscriber_capacity: 1,
            drain_timeout: Duration::from_millis(1),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the receive buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the per-subscriber channel capacity.
    ///
    /// Values below 1 are raised to 1.
    #[must_use]
    pub const fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// Set the post-takeover drain window.
    #[must_use]
    pub const fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}
