//! HTTP to WebSocket upgrade.
//!
//! The HTTP layer stays outside this crate. It only has to expose the
//! request headers ([`UpgradeRequest`]) and hand over the raw stream together
//! with whatever it already buffered ([`Hijack`]).

use std::collections::HashMap;
use std::future::Future;
use std::hash::BuildHasher;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::Instant;
use tracing::debug;

use crate::config::Config;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::handshake::{SEC_WEBSOCKET_KEY, validate_key, write_response};

/// Read access to the headers of an upgrade request.
pub trait UpgradeRequest {
    /// Value of the header `name`, matched case-insensitively.
    fn header(&self, name: &str) -> Option<&str>;
}

impl<S: BuildHasher> UpgradeRequest for HashMap<String, String, S> {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A raw duplex stream taken over from the HTTP layer.
#[derive(Debug)]
pub struct Hijacked<T> {
    /// The raw stream.
    pub io: T,
    /// Bytes the HTTP layer had read past the request head.
    pub buffered: Bytes,
}

impl<T> Hijacked<T> {
    /// Pair a raw stream with the bytes already read from it.
    pub fn new(io: T, buffered: impl Into<Bytes>) -> Self {
        Self {
            io,
            buffered: buffered.into(),
        }
    }
}

/// A response sink that can hand over its connection.
pub trait Hijack: Sized {
    /// The raw stream type.
    type Io: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Whether this sink supports takeover at all.
    fn is_hijackable(&self) -> bool {
        true
    }

    /// Take exclusive ownership of the raw stream.
    fn hijack(self) -> impl Future<Output = std::io::Result<Hijacked<Self::Io>>> + Send;
}

impl<T> Hijack for Hijacked<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Io = T;

    async fn hijack(self) -> std::io::Result<Hijacked<T>> {
        Ok(self)
    }
}

impl<T> Hijack for BufReader<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Io = T;

    async fn hijack(self) -> std::io::Result<Hijacked<T>> {
        let buffered = Bytes::copy_from_slice(self.buffer());
        Ok(Hijacked::new(self.into_inner(), buffered))
    }
}

/// Upgrade an HTTP request to a WebSocket connection with default settings.
///
/// See [`accept_with_config`].
pub async fn accept<R, H>(request: &R, sink: H) -> Result<Connection<H::Io>>
where
    R: UpgradeRequest + ?Sized,
    H: Hijack,
{
    accept_with_config(request, sink, Config::default()).await
}

/// Upgrade an HTTP request to a WebSocket connection.
///
/// Validates `Sec-WebSocket-Key`, takes over the stream, discards bytes
/// that arrive within `config.drain_timeout` of takeover, writes the `101 Switching
/// Protocols` response and starts the connection's read loop.
///
/// On error before takeover the sink is dropped untouched and the HTTP layer
/// remains responsible for the request. If the response cannot be written
/// the raw stream is shut down.
///
/// # Errors
///
/// - `Error::Handshake` if the key is missing or malformed, or the response write fails
/// - `Error::NotHijackable` if the sink cannot hand over its stream
/// - `Error::Hijack` if the takeover itself fails
pub async fn accept_with_config<R, H>(
    request: &R,
    sink: H,
    config: Config,
) -> Result<Connection<H::Io>>
where
    R: UpgradeRequest + ?Sized,
    H: Hijack,
{
    let key = validate_key(request.header(SEC_WEBSOCKET_KEY))?.to_owned();

    if !sink.is_hijackable() {
        return Err(Error::NotHijackable);
    }
    let Hijacked { mut io, buffered } = sink
        .hijack()
        .await
        .map_err(|e| Error::Hijack(e.to_string()))?;

    // Best effort only: a fast client can still race bytes in after this
    let discarded = buffered.len() + drain_pending(&mut io, config.drain_timeout).await;
    if discarded > 0 {
        debug!(bytes = discarded, "discarded bytes read before upgrade");
    }

    let mut response = Vec::with_capacity(128);
    write_response(&key, &mut response);
    if let Err(e) = write_flush(&mut io, &response).await {
        let _ = io.shutdown().await;
        return Err(Error::Handshake(format!(
            "failed to write response (switching protocols): {e}"
        )));
    }

    debug!("websocket upgrade complete");
    Ok(Connection::new(io, config))
}

/// Read and drop whatever arrives within `window` of takeover.
async fn drain_pending<T: AsyncRead + Unpin>(io: &mut T, window: Duration) -> usize {
    let deadline = Instant::now() + window;
    let mut scratch = [0u8; 4096];
    let mut discarded = 0;
    loop {
        match tokio::time::timeout_at(deadline, io.read(&mut scratch)).await {
            Ok(Ok(0)) | Err(_) => return discarded,
            Ok(Ok(n)) => discarded += n,
            Ok(Err(e)) => {
                debug!(error = %e, "read failed while draining");
                return discarded;
            }
        }
    }
}

async fn write_flush<T: AsyncWrite + Unpin>(io: &mut T, data: &[u8]) -> std::io::Result<()> {
    io.write_all(data).await?;
    io.flush().await
}
