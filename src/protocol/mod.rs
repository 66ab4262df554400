//! WebSocket wire protocol: opcodes, masking, frame codec and handshake.

pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use frame::{MAX_PAYLOAD_LEN, Packet, decode, encode};
pub use handshake::{
    SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, WS_GUID, compute_accept_key, validate_key,
};
pub use mask::{apply_mask, apply_mask_fast};
pub use opcode::OpCode;
