//! WebSocket handshake helpers (RFC 6455).
//!
//! Computes the accept token and builds the `101 Switching Protocols`
//! response written on the hijacked stream.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Request header carrying the client's handshake key.
pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";

/// Response header carrying the computed accept token.
pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";

/// Exact length of a valid `Sec-WebSocket-Key` (base64 of 16 bytes).
pub const KEY_LEN: usize = 24;

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use hijack_ws::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    BASE64.encode(hash)
}

/// Check the handshake key taken from the request.
///
/// # Errors
///
/// Returns [`Error::Handshake`] if the key is missing or is not
/// exactly [`KEY_LEN`] characters long.
pub fn validate_key(key: Option<&str>) -> Result<&str> {
    match key {
        Some(key) if key.len() == KEY_LEN => Ok(key),
        Some(key) => Err(Error::Handshake(format!(
            "invalid {SEC_WEBSOCKET_KEY}: expected {KEY_LEN} characters, got {}",
            key.len()
        ))),
        None => Err(Error::Handshake(format!(
            "missing {SEC_WEBSOCKET_KEY}"
        ))),
    }
}

/// Write the `101 Switching Protocols` response for `key` to a buffer.
pub fn write_response(key: &str, buf: &mut Vec<u8>) {
    buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    buf.extend_from_slice(b"Upgrade: websocket\r\n");
    buf.extend_from_slice(b"Connection: Upgrade\r\n");
    buf.extend_from_slice(
        format!("{SEC_WEBSOCKET_ACCEPT}: {}\r\n", compute_accept_key(key)).as_bytes(),
    );
    buf.extend_from_slice(b"\r\n");
}
