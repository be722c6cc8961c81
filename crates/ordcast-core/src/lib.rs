//! Ordcast Core - Reliable Totally-Ordered Broadcast
//!
//! Every message broadcast by any member of a fixed group is delivered to
//! every member, in one agreed order.
//!
//! # Protocol
//!
//! 1. A process stamps a new message with its logical clock and sends it to
//!    every other member. It counts as having acknowledged its own message.
//! 2. A receiver queues the message (the sender counts as acknowledged), adds
//!    its own acknowledgment and sends `ack:{sender}-{timestamp}` to the group.
//! 3. A queued message is delivered once it is at the head of the queue
//!    (ordered by `(timestamp, sender)`) and every member has acknowledged it.
//!
//! # Why the Order Agrees
//!
//! Under the Lamport clock rule and FIFO links, a member cannot acknowledge a
//! message and later broadcast one that sorts before it. So once a head is
//! fully acknowledged, nothing that sorts ahead of it can still be in flight.
//!
//! # Layout
//!
//! - [`message`]: wire codec and total order
//! - [`queue`]: pending messages with acknowledgment sets
//! - [`process`]: the broadcast/receive/deliver state machine
//! - [`transport`]: traits the network layer implements
//! - [`memory`]: in-process transports for tests and simulation
//!
//! # Example
//!
//! ```
//! use ordcast_core::memory::RecordingTransport;
//! use ordcast_core::{BroadcastProcess, Party, ProcessConfig, ProcessId};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ordcast_core::Result<()> {
//! let party: Party = [1, 2, 3].into_iter().map(ProcessId).collect();
//! let transport = RecordingTransport::new();
//! let mut process = BroadcastProcess::new(ProcessConfig::new(ProcessId(1), party), transport)?;
//!
//! let id = process.broadcast("hello").await?;
//! assert_eq!(process.transport().take().len(), 2);
//! assert!(process.queue().contains(&id));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod message;
pub mod party;
pub mod process;
pub mod queue;
pub mod transport;

pub use error::{Error, QueueError, Result};
pub use message::{Message, MessageId, MessageKind, ProcessId, Timestamp, ACK_TAG, APP_TAG};
pub use party::Party;
pub use process::{BroadcastProcess, ClockRule, ProcessConfig, ProcessState, Shutdown};
pub use queue::PendingQueue;
pub use transport::{Inbox, InboxError, SendError, Transport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_distinct_and_terminated() {
        assert_ne!(ACK_TAG, APP_TAG);
        assert!(ACK_TAG.ends_with(':') && APP_TAG.ends_with(':'));
    }
}
