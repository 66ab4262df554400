use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::debug;

use crate::config::Config;
use crate::connection::ConnectionState;
use crate::connection::reader;
use crate::connection::registry::{Registry, Subscription};
use crate::connection::state::AtomicState;
use crate::error::{Error, Result};
use crate::protocol::Packet;

/// State shared by every [`Connection`] handle and the read loop.
pub(crate) struct Shared<T> {
    /// `None` once the connection is closed.
    writer: Mutex<Option<WriteHalf<T>>>,
    pub(crate) registry: Mutex<Registry>,
    state: AtomicState,
    closed: watch::Sender<bool>,
    pub(crate) config: Config,
}

impl<T: AsyncWrite> Shared<T> {
    /// Encode and write one frame, flushing it before the writer lock is released.
    ///
    /// A write still pending when the connection closes is abandoned.
    pub(crate) async fn send(&self, packet: &Packet) -> Result<()> {
        if !self.state.load().can_send() {
            return Err(Error::ConnectionClosed);
        }
        let frame = packet.encode()?;

        let write = async {
            let mut writer = self.writer.lock().await;
            let writer = writer.as_mut().ok_or(Error::ConnectionClosed)?;
            writer.write_all(&frame).await?;
            writer.flush().await?;
            Ok::<(), Error>(())
        };
        tokio::select! {
            biased;
            () = self.wait_closed() => Err(Error::ConnectionClosed),
            result = write => result,
        }
    }

    /// Close every subscriber channel, stop the read loop and close the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection was already closed.
    pub(crate) async fn close(&self) -> Result<()> {
        if !self.state.close() {
            return Err(Error::ConnectionClosed);
        }
        // Wakes the read loop and any writer blocked on the stream or a full subscriber
        self.closed.send_replace(true);
        self.registry.lock().await.close();

        // The stream is released once the read loop drops its half too
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer.shutdown().await?;
        }
        debug!("websocket connection closed");
        Ok(())
    }

    /// Resolve once the connection has been closed.
    pub(crate) async fn wait_closed(&self) {
        let mut closed = self.closed.subscribe();
        loop {
            let is_closed = *closed.borrow_and_update();
            if is_closed || closed.changed().await.is_err() {
                return;
            }
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.load() == ConnectionState::Closed
    }
}

/// A live server-side WebSocket connection.
///
/// Created by [`accept`](crate::accept) once the handshake succeeds. A
/// background read loop decodes incoming frames for the whole life of the
/// connection: it answers pings, hands pongs to [`check_alive`], delivers
/// text and binary packets to subscribers and tears the connection down on
/// a close frame, a read error or end of stream.
///
/// `Connection` is a cheap handle; clones share the same underlying stream.
///
/// ## Example
///
/// ```rust,ignore
/// use hijack_ws::{accept, OpCode};
///
/// let conn = accept(&headers, reader).await?;
/// conn.subscribe(|mut sub| async move {
///     while let Some(packet) = sub.recv().await {
///         if packet.opcode == OpCode::Text {
///             println!("Received: {:?}", packet.as_text());
///         }
///     }
/// })
/// .await;
/// ```
///
/// [`check_alive`]: Connection::check_alive
pub struct Connection<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.shared.state.load())
            .finish_non_exhaustive()
    }
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a stream that has completed the handshake and start its read loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn new(io: T, config: Config) -> Self {
        let (read_half, write_half) = tokio::io::split(io);
        let (closed, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            writer: Mutex::new(Some(write_half)),
            registry: Mutex::new(Registry::default()),
            state: AtomicState::default(),
            closed,
            config,
        });

        tokio::spawn(reader::run(Arc::clone(&shared), read_half));
        Self { shared }
    }
}

impl<T: AsyncWrite> Connection<T> {
    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    /// Check if the connection is open.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Send a packet as a single unmasked frame.
    ///
    /// ## Errors
    ///
    /// - `Error::ConnectionClosed` if the connection is closing or closed
    /// - `Error::FrameTooLarge` if the payload cannot be encoded
    /// - I/O errors from the underlying stream
    pub async fn send(&self, packet: &Packet) -> Result<()> {
        self.shared.send(packet).await
    }

    /// Send a text frame.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.send(&Packet::text(text)).await
    }

    /// Send a binary frame.
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(&Packet::binary(data)).await
    }

    /// Send a ping frame.
    pub async fn send_ping(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(&Packet::ping(data)).await
    }

    /// Number of subscriber channels currently registered.
    pub async fn subscriber_count(&self) -> usize {
        self.shared.registry.lock().await.subscriber_count()
    }

    /// Register a subscriber for the duration of `callback`.
    ///
    /// `callback` receives the read-only end of a fresh channel fed with
    /// every text and binary packet the read loop decodes. The channel is
    /// removed from the registry once the callback's future completes, and
    /// ends early (yields `None`) if the connection closes.
    ///
    /// A subscriber that stops draining its channel stalls the read loop,
    /// and with it every other subscriber of this connection.
    pub async fn subscribe<F, Fut>(&self, callback: F) -> Fut::Output
    where
        F: FnOnce(Subscription) -> Fut,
        Fut: Future,
    {
        let (id, subscription) = self
            .shared
            .registry
            .lock()
            .await
            .subscribe(self.shared.config.subscriber_capacity);

        let output = callback(subscription).await;

        if let Some(id) = id {
            self.shared.registry.lock().await.unsubscribe(id);
        }
        output
    }

    /// Send an empty ping and wait up to `timeout` for a pong.
    ///
    /// Returns `Ok(true)` if a pong arrived in time and `Ok(false)` if the
    /// deadline passed or the connection closed first.
    ///
    /// ## Errors
    ///
    /// - `Error::CheckAliveRunning` if another check is outstanding; no ping is sent
    /// - `Error::ConnectionClosed` or I/O errors if the ping cannot be sent
    pub async fn check_alive(&self, timeout: Duration) -> Result<bool> {
        let (tx, mut rx) = mpsc::channel(1);
        let waiter = self.shared.registry.lock().await.set_pong_waiter(tx)?;

        let outcome = match self.send_ping(Bytes::new()).await {
            Ok(()) => Ok(matches!(
                tokio::time::timeout(timeout, rx.recv()).await,
                Ok(Some(_))
            )),
            Err(e) => Err(e),
        };

        self.shared.registry.lock().await.clear_pong_waiter(waiter);
        rx.close();
        outcome
    }

    /// Send a close frame, ignoring failures, then [`close`](Self::close).
    ///
    /// ## Errors
    ///
    /// - `Error::ConnectionClosed` if the connection was already closed
    pub async fn shutdown(&self) -> Result<()> {
        if self.shared.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let _ = self.send(&Packet::close()).await;
        self.shared.state.begin_closing();
        self.close().await
    }

    /// Close every subscriber channel, then close the stream.
    ///
    /// Only the first call takes effect.
    ///
    /// ## Errors
    ///
    /// - `Error::ConnectionClosed` if the connection was already closed
    /// - I/O errors from shutting down the stream
    pub async fn close(&self) -> Result<()> {
        self.shared.close().await
    }
}
