//! In-process transports.
//!
//! - [`MemoryNetwork`] wires processes together with unbounded channels. Each
//!   receiver has one channel, so frames between any two processes stay FIFO.
//! - [`RecordingTransport`] captures outbound frames instead of sending them,
//!   for tests that drive delivery order by hand.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::message::ProcessId;
use crate::transport::{Inbox, InboxError, SendError, Transport};

type Routes = HashMap<ProcessId, mpsc::UnboundedSender<Bytes>>;

/// A switchboard of in-process channels.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    routes: Arc<RwLock<Routes>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach process `id`, returning its outbound and inbound halves.
    pub fn join(&self, id: ProcessId, idle_timeout: Duration) -> (MemoryTransport, MemoryInbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        (
            MemoryTransport {
                network: self.clone(),
            },
            MemoryInbox { rx, idle_timeout },
        )
    }

    /// Push a raw frame into `id`'s inbox, as an application driver would.
    pub fn inject(&self, id: ProcessId, frame: Bytes) -> Result<(), SendError> {
        self.route(id)?
            .send(frame)
            .map_err(|_| SendError::new(id, "inbox closed"))
    }

    /// Make `id` unreachable. Later sends to it fail.
    pub fn sever(&self, id: ProcessId) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn route(&self, id: ProcessId) -> Result<mpsc::UnboundedSender<Bytes>, SendError> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| SendError::new(id, "no route to process"))
    }
}

/// Outbound half bound to a [`MemoryNetwork`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    network: MemoryNetwork,
}

impl Transport for MemoryTransport {
    async fn send_to(&self, peer: ProcessId, frame: Bytes) -> Result<(), SendError> {
        trace!(%peer, len = frame.len(), "memory send");
        self.network.inject(peer, frame)
    }
}

/// Inbound half bound to a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryInbox {
    rx: mpsc::UnboundedReceiver<Bytes>,
    idle_timeout: Duration,
}

impl Inbox for MemoryInbox {
    async fn receive_next(&mut self) -> Result<Bytes, InboxError> {
        match tokio::time::timeout(self.idle_timeout, self.rx.recv()).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(InboxError::Closed),
            Err(_) => Err(InboxError::Timeout(self.idle_timeout)),
        }
    }
}

#[derive(Debug, Default)]
struct Recorded {
    sent: Vec<(ProcessId, Bytes)>,
    unreachable: BTreeSet<ProcessId>,
}

/// Transport that records frames instead of sending them.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain every frame recorded so far, in send order.
    pub fn take(&self) -> Vec<(ProcessId, Bytes)> {
        std::mem::take(&mut self.lock().sent)
    }

    /// Make sends to `peer` fail.
    pub fn fail_peer(&self, peer: ProcessId) {
        self.lock().unreachable.insert(peer);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for RecordingTransport {
    async fn send_to(&self, peer: ProcessId, frame: Bytes) -> Result<(), SendError> {
        let mut recorded = self.lock();
        if recorded.unreachable.contains(&peer) {
            return Err(SendError::new(peer, "peer marked unreachable"));
        }
        recorded.sent.push((peer, frame));
        Ok(())
    }
}
