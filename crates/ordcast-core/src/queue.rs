//! Pending queue: messages awaiting their acknowledgment quorum.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::QueueError;
use crate::message::{Message, MessageId, ProcessId};
use crate::party::Party;

#[derive(Debug, Clone)]
struct Pending {
    message: Message,
    acks: BTreeSet<ProcessId>,
}

/// Not-yet-delivered messages, sorted by the message total order.
///
/// Each entry carries the set of processes that acknowledged it. The entry and
/// its ack set are created together and removed together.
#[derive(Debug, Default)]
pub struct PendingQueue {
    /// Keyed by identity; `MessageId` orders as `(timestamp, sender)`.
    entries: BTreeMap<MessageId, Pending>,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Insert `message`, seeding its ack set with `ack_initiator`.
    pub fn enqueue(&mut self, message: Message, ack_initiator: ProcessId) -> Result<(), QueueError> {
        let id = message.id();
        if self.entries.contains_key(&id) {
            return Err(QueueError::DuplicateMessage(id));
        }
        self.entries.insert(
            id,
            Pending {
                message,
                acks: BTreeSet::from([ack_initiator]),
            },
        );
        Ok(())
    }

    /// Lowest-ordered message, left in place.
    pub fn peek(&self) -> Result<&Message, QueueError> {
        self.entries
            .values()
            .next()
            .map(|pending| &pending.message)
            .ok_or(QueueError::EmptyQueue)
    }

    /// Remove and return the lowest-ordered message. Its ack set is dropped.
    pub fn dequeue(&mut self) -> Result<Message, QueueError> {
        self.entries
            .pop_first()
            .map(|(_, pending)| pending.message)
            .ok_or(QueueError::EmptyQueue)
    }

    /// Record that `acker` acknowledged `id`.
    ///
    /// Returns true if the ack was new.
    pub fn record_ack(&mut self, id: MessageId, acker: ProcessId) -> Result<bool, QueueError> {
        self.entries
            .get_mut(&id)
            .map(|pending| pending.acks.insert(acker))
            .ok_or(QueueError::UnknownMessage(id))
    }

    /// True iff every member of `party` acknowledged `id`.
    pub fn is_deliverable(&self, id: &MessageId, party: &Party) -> bool {
        self.entries
            .get(id)
            .is_some_and(|pending| party.is_covered_by(&pending.acks))
    }

    /// Ack set of a pending message.
    pub fn acks(&self, id: &MessageId) -> Option<&BTreeSet<ProcessId>> {
        self.entries.get(id).map(|pending| &pending.acks)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.contains_key(id)
    }

    /// Pending messages in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.values().map(|pending| &pending.message)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Timestamp;

    fn msg(sender: u64, timestamp: Timestamp) -> Message {
        Message::original(ProcessId(sender), timestamp, format!("m{sender}-{timestamp}"))
    }

    fn party(ids: &[u64]) -> Party {
        ids.iter().copied().map(ProcessId).collect()
    }

    #[test]
    fn enqueue_seeds_ack_initiator() {
        let mut queue = PendingQueue::new();
        let m = msg(2, 5);
        queue.enqueue(m.clone(), ProcessId(2)).unwrap();

        let acks = queue.acks(&m.id()).unwrap();
        assert_eq!(acks.iter().copied().collect::<Vec<_>>(), vec![ProcessId(2)]);
    }

    #[test]
    fn peek_returns_lowest_regardless_of_insertion_order() {
        let mut queue = PendingQueue::new();
        queue.enqueue(msg(1, 9), ProcessId(1)).unwrap();
        queue.enqueue(msg(3, 2), ProcessId(3)).unwrap();
        queue.enqueue(msg(2, 2), ProcessId(2)).unwrap();

        assert_eq!(queue.peek().unwrap().id(), msg(2, 2).id());
        let order: Vec<_> = queue.iter().map(Message::id).collect();
        assert_eq!(order, vec![msg(2, 2).id(), msg(3, 2).id(), msg(1, 9).id()]);
    }

    #[test]
    fn dequeue_discards_ack_set() {
        let mut queue = PendingQueue::new();
        let m = msg(1, 1);
        queue.enqueue(m.clone(), ProcessId(1)).unwrap();

        assert_eq!(queue.dequeue().unwrap(), m);
        assert!(queue.acks(&m.id()).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_queue_errors() {
        let mut queue = PendingQueue::new();
        assert_eq!(queue.peek().unwrap_err(), QueueError::EmptyQueue);
        assert_eq!(queue.dequeue().unwrap_err(), QueueError::EmptyQueue);
    }

    #[test]
    fn duplicate_enqueue_rejected() {
        let mut queue = PendingQueue::new();
        queue.enqueue(msg(1, 1), ProcessId(1)).unwrap();
        assert_eq!(
            queue.enqueue(msg(1, 1), ProcessId(2)).unwrap_err(),
            QueueError::DuplicateMessage(msg(1, 1).id())
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn unknown_ack_reported() {
        let mut queue = PendingQueue::new();
        let missing = msg(4, 4).id();
        assert_eq!(
            queue.record_ack(missing, ProcessId(1)).unwrap_err(),
            QueueError::UnknownMessage(missing)
        );
    }

    #[test]
    fn partial_quorum_is_not_deliverable() {
        let mut queue = PendingQueue::new();
        let group = party(&[1, 2, 3]);
        let m = msg(1, 1);
        queue.enqueue(m.clone(), ProcessId(1)).unwrap();
        assert!(queue.record_ack(m.id(), ProcessId(2)).unwrap());

        assert!(!queue.is_deliverable(&m.id(), &group));

        assert!(queue.record_ack(m.id(), ProcessId(3)).unwrap());
        assert!(queue.is_deliverable(&m.id(), &group));
    }

    #[test]
    fn repeated_ack_is_not_new() {
        let mut queue = PendingQueue::new();
        let m = msg(1, 1);
        queue.enqueue(m.clone(), ProcessId(1)).unwrap();
        assert!(!queue.record_ack(m.id(), ProcessId(1)).unwrap());
    }

    #[test]
    fn unknown_message_is_not_deliverable() {
        let queue = PendingQueue::new();
        assert!(!queue.is_deliverable(&msg(1, 1).id(), &party(&[1])));
    }
}
