//! Error types for ordcast-core.

use thiserror::Error;

use crate::message::{MessageId, ProcessId};
use crate::transport::{InboxError, SendError};

/// Result type for ordcast-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the pending queue.
///
/// All of these are recoverable: they signal a duplicated or reordered
/// acknowledgment, not corruption.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Peek or dequeue on an empty queue.
    #[error("pending queue is empty")]
    EmptyQueue,

    /// An acknowledgment referenced a message that is not queued.
    #[error("no pending message {0}")]
    UnknownMessage(MessageId),

    /// The message is already queued.
    #[error("message {0} is already pending")]
    DuplicateMessage(MessageId),
}

/// Errors that can occur while running a broadcast process.
#[derive(Debug, Error)]
pub enum Error {
    /// Inbound bytes could not be decoded into a message.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Pending queue bookkeeping failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A peer could not be reached within the transport's retry budget.
    #[error(transparent)]
    Send(#[from] SendError),

    /// The inbound side of the transport failed.
    #[error(transparent)]
    Inbox(#[from] InboxError),

    /// An original broadcast body collides with a control tag.
    #[error("broadcast body must not start with reserved tag {tag:?}")]
    ReservedBody { tag: &'static str },

    /// The process is not listed in its own party.
    #[error("process {0} is not a member of the party")]
    NotAMember(ProcessId),

    /// The logical clock cannot advance past `u64::MAX`.
    #[error("logical clock of process {0} is exhausted")]
    ClockExhausted(ProcessId),

    /// The process has stopped and accepts no further events.
    #[error("process {0} has stopped")]
    Stopped(ProcessId),
}
