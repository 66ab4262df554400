//! # hijack-ws - Server-side WebSocket connections over hijacked HTTP streams
//!
//! `hijack-ws` takes over the raw stream of an HTTP/1.1 upgrade request,
//! completes the WebSocket handshake and runs the connection on Tokio.
//!
//! ## Features
//!
//! - **Handshake upgrader** that works with any HTTP layer able to give up its stream
//! - **Frame codec** for unfragmented frames with masked or unmasked payloads
//! - **Subscriber fan-out** of every text and binary packet
//! - **Keepalive** through ping/pong round trips
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hijack_ws::accept;
//! use tokio::io::BufReader;
//!
//! // `reader` has consumed the request head, `headers` holds its fields
//! let conn = accept(&headers, reader).await?;
//! conn.send_text("hello").await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod upgrade;

pub use config::Config;
pub use connection::{Connection, ConnectionState, Subscription};
pub use error::{Error, Result};
pub use protocol::{OpCode, Packet, WS_GUID, compute_accept_key};
pub use upgrade::{Hijack, Hijacked, UpgradeRequest, accept, accept_with_config};
