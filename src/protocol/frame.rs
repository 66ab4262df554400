//! WebSocket frame encoding and decoding.
//!
//! Pure conversions between [`Packet`]s and wire bytes. No state, no I/O.
//!
//! ## Frame Structure
//!
//! ```text
//! +--------+-+-------------+-------------------------------+
//! | opcode |M| Payload len |    Extended payload length    |
//! |  (8)   |A|     (7)     |             (16/64)           |
//! |        |S|             |   (if payload len==126/127)   |
//! |        |K|             |                               |
//! +--------+-+-------------+-------------------------------+
//! |               Masking key (if MASK is set)             |
//! +--------------------------------------------------------+
//! |                     Payload data                       |
//! +--------------------------------------------------------+
//! ```
//!
//! Only the low 4 bytes of the 64-bit extended length are honored, so the
//! largest representable payload is `u32::MAX` bytes.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask_fast;

/// Largest payload the length encoding can represent.
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize;

const LEN_16: u8 = 126;
const LEN_64: u8 = 127;
const MASK_BIT: u8 = 0x80;

/// A decoded or to-be-encoded WebSocket unit: an opcode and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Frame opcode.
    pub opcode: OpCode,
    /// Payload bytes, already unmasked.
    pub data: Bytes,
}

impl Packet {
    /// Create a packet.
    #[must_use]
    pub fn new(opcode: OpCode, data: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            data: data.into(),
        }
    }

    /// Create a text packet.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self::new(OpCode::Text, text)
    }

    /// Create a binary packet.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Binary, data)
    }

    /// Create a ping packet.
    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Ping, data)
    }

    /// Create a pong packet.
    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Pong, data)
    }

    /// Create an empty close packet.
    #[must_use]
    pub fn close() -> Self {
        Self::new(OpCode::Close, Bytes::new())
    }

    /// Payload as UTF-8 text, if it is valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Encode this packet as an unmasked frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if the payload exceeds [`MAX_PAYLOAD_LEN`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self.opcode, &self.data)
    }
}

/// Size of the length header (without the opcode byte) for a payload.
#[inline]
const fn length_header_size(payload_len: usize) -> usize {
    if payload_len < LEN_16 as usize {
        1
    } else if payload_len <= u16::MAX as usize {
        3
    } else {
        9
    }
}

/// Calculate the number of bytes [`encode`] produces for a payload.
#[must_use]
pub const fn wire_size(payload_len: usize) -> usize {
    1 + length_header_size(payload_len) + payload_len
}

/// Encode an unmasked frame.
///
/// The length header is picked by payload size: one byte below 126, the
/// 126 marker plus a 16-bit length up to 65535, otherwise the 127 marker
/// plus 8 bytes whose upper half is zero.
///
/// # Errors
///
/// Returns [`Error::FrameTooLarge`] if the payload exceeds [`MAX_PAYLOAD_LEN`].
pub fn encode(opcode: OpCode, payload: &[u8]) -> Result<Vec<u8>> {
    let payload_len = payload.len();
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(Error::FrameTooLarge {
            size: payload_len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut buf = Vec::with_capacity(wire_size(payload_len));
    buf.push(opcode.as_u8());

    match length_header_size(payload_len) {
        1 => buf.push(payload_len as u8),
        3 => {
            buf.push(LEN_16);
            buf.extend_from_slice(&(payload_len as u16).to_be_bytes());
        }
        _ => {
            buf.push(LEN_64);
            buf.extend_from_slice(&[0; 4]);
            buf.extend_from_slice(&(payload_len as u32).to_be_bytes());
        }
    }

    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode one frame from the front of `buf`.
///
/// Returns the packet and the unconsumed remainder of `buf`, so several
/// frames delivered by one read can be decoded in sequence. Masked payloads
/// are unmasked.
///
/// # Errors
///
/// Returns [`Error::IncompleteFrame`] if `buf` is shorter than the frame
/// its header declares. This is not fatal: nothing is consumed, and the
/// caller should append more bytes and decode again.
pub fn decode(buf: &[u8]) -> Result<(Packet, &[u8])> {
    if buf.len() < 2 {
        return Err(Error::IncompleteFrame {
            needed: 2 - buf.len(),
        });
    }

    let opcode = OpCode::from_u8(buf[0]);
    let masked = buf[1] & MASK_BIT != 0;

    let (payload_len, len_end) = match buf[1] & !MASK_BIT {
        LEN_64 => {
            require(buf, 10)?;
            // Upper 4 bytes of the 64-bit length are ignored
            let len = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]) as usize;
            (len, 10)
        }
        LEN_16 => {
            require(buf, 4)?;
            (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
        }
        len => (len as usize, 2),
    };

    let header_len: usize = if masked { len_end + 4 } else { len_end };
    let total = header_len
        .checked_add(payload_len)
        .ok_or(Error::FrameTooLarge {
            size: usize::MAX,
            max: MAX_PAYLOAD_LEN,
        })?;
    require(buf, total)?;

    let payload = &buf[header_len..total];
    let data = if masked {
        let mask = [buf[len_end], buf[len_end + 1], buf[len_end + 2], buf[len_end + 3]];
        let mut data = payload.to_vec();
        apply_mask_fast(&mut data, mask);
        Bytes::from(data)
    } else {
        Bytes::copy_from_slice(payload)
    };

    Ok((Packet { opcode, data }, &buf[total..]))
}

#[inline]
fn require(buf: &[u8], len: usize) -> Result<()> {
    if buf.len() < len {
        Err(Error::IncompleteFrame {
            needed: len - buf.len(),
        })
    } else {
        Ok(())
    }
}
