//! Live WebSocket connection management.
//!
//! This module provides the `Connection` type: the raw stream, the subscriber
//! registry and the keepalive slot of one upgraded HTTP connection, plus the
//! background read loop that feeds them.
//!
//! ## Connection Lifecycle
//!
//! 1. **Open** - State after a successful handshake; the read loop is running
//! 2. **Closing** - `shutdown` has sent a close frame
//! 3. **Closed** - Subscriber channels and the stream are closed
//!
//! A connection closes when the peer sends a close frame, when the stream
//! ends or fails, when a frame cannot fit in the receive buffer, or when the
//! application calls `shutdown` or `close`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//!
//! let conn = hijack_ws::accept(&headers, reader).await?;
//!
//! let keepalive = conn.clone();
//! tokio::spawn(async move {
//!     if !keepalive.check_alive(Duration::from_secs(10)).await.unwrap_or(false) {
//!         let _ = keepalive.shutdown().await;
//!     }
//! });
//!
//! conn.subscribe(|mut sub| async move {
//!     while let Some(packet) = sub.recv().await {
//!         println!("Received: {:?}", packet);
//!     }
//! })
//! .await;
//! ```

mod reader;
mod registry;
mod state;

pub use registry::Subscription;
pub use state::ConnectionState;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::Connection;
