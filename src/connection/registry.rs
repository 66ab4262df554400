//! Subscriber registry and pong-waiter slot.
//!
//! Both live behind the connection's single lock. The read loop feeds them,
//! application tasks register and drain them.

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::Packet;

/// Key of a registered subscriber channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SubscriberId(u64);

/// Token identifying one installed pong waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WaiterId(u64);

/// Read-only end of a subscriber channel.
///
/// Yields every text and binary packet received while the subscription is
/// registered, in arrival order. Returns `None` once the connection closes.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<Packet>,
}

impl Subscription {
    /// Receive the next packet, or `None` once the connection has closed.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Receive a packet if one is already queued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] once the connection has closed and
    /// the queue is drained.
    pub fn try_recv(&mut self) -> Result<Option<Packet>> {
        match self.rx.try_recv() {
            Ok(packet) => Ok(Some(packet)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(Error::ConnectionClosed),
        }
    }
}

impl Stream for Subscription {
    type Item = Packet;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Packet>> {
        self.rx.poll_recv(cx)
    }
}

/// State guarded by the connection lock.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    subscribers: HashMap<SubscriberId, mpsc::Sender<Packet>>,
    next_id: u64,
    pong_waiter: Option<(WaiterId, mpsc::Sender<Packet>)>,
    next_waiter: u64,
    closed: bool,
}

impl Registry {
    /// Register a new subscriber channel.
    ///
    /// After the registry is closed no channel is registered and the returned
    /// subscription is already at its end.
    pub(crate) fn subscribe(&mut self, capacity: usize) -> (Option<SubscriberId>, Subscription) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        if self.closed {
            return (None, Subscription { rx });
        }
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.subscribers.insert(id, tx);
        (Some(id), Subscription { rx })
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriberId) {
        self.subscribers.remove(&id);
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver a copy of `packet` to every registered subscriber.
    ///
    /// Waits on full channels; the caller holds the connection lock for the
    /// whole delivery. Subscribers whose receiving end is gone are dropped.
    pub(crate) async fn broadcast(&mut self, packet: &Packet) -> usize {
        let mut delivered = 0;
        let mut gone = Vec::new();

        for (id, tx) in &self.subscribers {
            if tx.send(packet.clone()).await.is_ok() {
                delivered += 1;
            } else {
                gone.push(*id);
            }
        }

        for id in gone {
            self.subscribers.remove(&id);
        }
        delivered
    }

    /// Install the single pong waiter.
    ///
    /// A waiter whose receiver was dropped belongs to an abandoned check and
    /// is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CheckAliveRunning`] if a live waiter is registered,
    /// and [`Error::ConnectionClosed`] after the registry was closed.
    pub(crate) fn set_pong_waiter(&mut self, tx: mpsc::Sender<Packet>) -> Result<WaiterId> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        if self
            .pong_waiter
            .as_ref()
            .is_some_and(|(_, w)| !w.is_closed())
        {
            return Err(Error::CheckAliveRunning);
        }
        let id = WaiterId(self.next_waiter);
        self.next_waiter += 1;
        self.pong_waiter = Some((id, tx));
        Ok(id)
    }

    /// Remove the pong waiter if it is still the one installed as `id`.
    pub(crate) fn clear_pong_waiter(&mut self, id: WaiterId) {
        if self.pong_waiter.as_ref().is_some_and(|(w, _)| *w == id) {
            self.pong_waiter = None;
        }
    }

    /// Hand a pong to the waiter without blocking. Extra pongs are discarded.
    pub(crate) fn deliver_pong(&self, packet: Packet) -> bool {
        self.pong_waiter
            .as_ref()
            .is_some_and(|(_, w)| w.try_send(packet).is_ok())
    }

    /// Close every subscriber channel and drop the pong waiter.
    ///
    /// Later subscriptions start closed.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.subscribers.clear();
        self.pong_waiter = None;
    }
}
