//! WebSocket frame opcodes as they appear on the wire.
//!
//! Each code is the whole first frame byte with the FIN bit set, so a frame
//! is always a complete message. Fragmented frames are not produced and are
//! not reassembled.

/// WebSocket frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Continuation frame (0x80). Received and dropped.
    Continuation,

    /// Text frame (0x81).
    Text,

    /// Binary frame (0x82).
    Binary,

    /// Close frame (0x88).
    Close,

    /// Ping frame (0x89). Answered with a Pong carrying the same payload.
    Ping,

    /// Pong frame (0x8a).
    Pong,

    /// Any other first byte. Ignored by the read loop.
    Other(u8),
}

impl OpCode {
    /// Create OpCode from the first byte of a frame.
    #[inline]
    #[must_use]
    pub const fn from_u8(byte: u8) -> Self {
        match byte {
            0x80 => OpCode::Continuation,
            0x81 => OpCode::Text,
            0x82 => OpCode::Binary,
            0x88 => OpCode::Close,
            0x89 => OpCode::Ping,
            0x8a => OpCode::Pong,
            other => OpCode::Other(other),
        }
    }

    /// Convert OpCode to the raw first frame byte.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x80,
            OpCode::Text => 0x81,
            OpCode::Binary => 0x82,
            OpCode::Close => 0x88,
            OpCode::Ping => 0x89,
            OpCode::Pong => 0x8a,
            OpCode::Other(byte) => byte,
        }
    }

    /// Check if this is a control frame opcode.
    ///
    /// Control frames: Close, Ping, Pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Check if this opcode carries application data delivered to subscribers.
    #[inline]
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self, OpCode::Text | OpCode::Binary)
    }

    /// Get human-readable name for this opcode.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OpCode::Continuation => "Continuation",
            OpCode::Text => "Text",
            OpCode::Binary => "Binary",
            OpCode::Close => "Close",
            OpCode::Ping => "Ping",
            OpCode::Pong => "Pong",
            OpCode::Other(_) => "Other",
        }
    }
}

impl From<u8> for OpCode {
    fn from(byte: u8) -> Self {
        OpCode::from_u8(byte)
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpCode::Other(byte) => write!(f, "Other({byte:#04x})"),
            _ => write!(f, "{}", self.name()),
        }
    }
}
