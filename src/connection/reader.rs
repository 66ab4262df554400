//! Per-connection read loop.
//!
//! The only reader of the stream. Decodes frames in arrival order and
//! dispatches each one before decoding the next.

use std::ops::ControlFlow;
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use tracing::{debug, trace, warn};

use crate::connection::connection::Shared;
use crate::error::{Error, Result};
use crate::protocol::{OpCode, Packet, decode};

/// Why the loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    CloseFrame,
    EndOfStream,
    Closed,
}

/// Run until the peer closes, the stream fails or the connection is closed
/// locally, then make sure the connection is torn down.
pub(crate) async fn run<T>(shared: Arc<Shared<T>>, mut reader: ReadHalf<T>)
where
    T: AsyncRead + AsyncWrite,
{
    debug!(
        buffer = shared.config.read_buffer_size,
        "websocket read loop started"
    );
    let outcome = tokio::select! {
        biased;
        () = shared.wait_closed() => Ok(Stop::Closed),
        outcome = read_frames(&shared, &mut reader) => outcome,
    };

    match outcome {
        Ok(stop) => debug!(reason = ?stop, "websocket read loop stopped"),
        Err(e) => warn!(error = %e, "websocket read loop failed"),
    }

    if !shared.is_closed() {
        if let Err(e) = shared.close().await {
            debug!(error = %e, "closing after read loop exit failed");
        }
    }
}

async fn read_frames<T>(shared: &Shared<T>, reader: &mut ReadHalf<T>) -> Result<Stop>
where
    T: AsyncRead + AsyncWrite,
{
    // Room for at least a bare two-byte header
    let capacity = shared.config.read_buffer_size.max(2);
    let mut buf = BytesMut::with_capacity(capacity);

    loop {
        // Always positive: a frame that could not fit was rejected below
        let room = capacity - buf.len();
        let n = reader.read_buf(&mut (&mut buf).limit(room)).await?;
        if n == 0 {
            return Ok(Stop::EndOfStream);
        }

        loop {
            let decoded = decode(&buf).map(|(packet, rest)| (packet, buf.len() - rest.len()));
            match decoded {
                Ok((packet, consumed)) => {
                    buf.advance(consumed);
                    if dispatch(shared, packet).await.is_break() {
                        return Ok(Stop::CloseFrame);
                    }
                }
                Err(Error::IncompleteFrame { needed }) => {
                    let size = buf.len().saturating_add(needed);
                    if size > capacity {
                        return Err(Error::FrameTooLarge {
                            size,
                            max: capacity,
                        });
                    }
                    break;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn dispatch<T: AsyncWrite>(shared: &Shared<T>, packet: Packet) -> ControlFlow<()> {
    trace!(opcode = %packet.opcode, len = packet.data.len(), "frame received");

    match packet.opcode {
        // Fragmented messages are not reassembled
        OpCode::Continuation => {}
        OpCode::Ping => {
            if let Err(e) = shared.send(&Packet::pong(packet.data)).await {
                debug!(error = %e, "failed to answer ping");
            }
        }
        OpCode::Pong => {
            shared.registry.lock().await.deliver_pong(packet);
        }
        OpCode::Close => return ControlFlow::Break(()),
        OpCode::Text | OpCode::Binary => {
            shared.registry.lock().await.broadcast(&packet).await;
        }
        OpCode::Other(_) => {}
    }
    ControlFlow::Continue(())
}
