//! Boundary traits between the ordering engine and the network.
//!
//! The engine never opens sockets itself. It needs two things:
//!
//! - [`Transport::send_to`]: push one encoded frame to one peer, with whatever
//!   connect-retry policy the implementation has.
//! - [`Inbox::receive_next`]: wait for the next complete inbound frame.
//!
//! `ordcast-transfer` implements both over TCP; [`crate::memory`] implements
//! them over in-process channels.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::message::ProcessId;

/// A peer send that exhausted the transport's retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("send to process {peer} failed: {reason}")]
pub struct SendError {
    /// The unreachable peer.
    pub peer: ProcessId,
    /// Transport-specific description of the failure.
    pub reason: String,
}

impl SendError {
    /// Create a send error for `peer`.
    pub fn new(peer: ProcessId, reason: impl Into<String>) -> Self {
        Self {
            peer,
            reason: reason.into(),
        }
    }
}

/// Failure modes of the inbound side.
#[derive(Debug, Error)]
pub enum InboxError {
    /// Nothing arrived within the idle window. This is the normal way a
    /// process winds down.
    #[error("no inbound message within {0:?}")]
    Timeout(Duration),

    /// The inbound channel was closed.
    #[error("inbox closed")]
    Closed,

    /// Listener I/O failure.
    #[error("inbox I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound half of a transport.
pub trait Transport: Send + Sync {
    /// Deliver one encoded frame to `peer`.
    fn send_to(
        &self,
        peer: ProcessId,
        frame: Bytes,
    ) -> impl Future<Output = Result<(), SendError>> + Send;
}

/// Inbound half of a transport.
pub trait Inbox: Send {
    /// Wait for the next complete inbound frame.
    fn receive_next(&mut self) -> impl Future<Output = Result<Bytes, InboxError>> + Send;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn send_to(
        &self,
        peer: ProcessId,
        frame: Bytes,
    ) -> impl Future<Output = Result<(), SendError>> + Send {
        (**self).send_to(peer, frame)
    }
}
