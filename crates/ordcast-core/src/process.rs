//! Broadcast process: the ordering and delivery state machine.
//!
//! # Event Handling
//!
//! Every locally observed event advances the logical clock once, before its
//! logic runs. Inbound frames are dispatched on their [`MessageKind`]:
//!
//! | Kind | Action |
//! |------|--------|
//! | `Original` | enqueue (sender pre-acked), ack it ourselves, send `ack:` to the group |
//! | `Ack` | record against the referenced message, then drain deliverable messages |
//! | `AppSubmission` | broadcast the payload as a new original from this process |
//!
//! # Delivery Rule
//!
//! The head of the pending queue is delivered once every party member has
//! acknowledged it. Delivery drains: one acknowledgment can release several
//! queued messages in a single pass.
//!
//! # Failure Model
//!
//! Duplicate, late and early acknowledgments are logged and absorbed.
//! Acknowledgments that overtake their original are parked and applied when
//! the original arrives; under the Lamport rule, parked acks for keys below the
//! last delivery are dropped, since those originals can no longer arrive.
//! Originals from outside the party, or claiming to be ours, are dropped.
//!
//! A peer that cannot be reached within the transport's retry budget stops
//! the process: the group assumes all members are live. So does a clock that
//! would overflow.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, QueueError, Result};
use crate::message::{reserved_tag, Message, MessageId, MessageKind, ProcessId, Timestamp};
use crate::party::Party;
use crate::queue::PendingQueue;
use crate::transport::{Inbox, InboxError, Transport};

/// How the logical clock reacts to inbound timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockRule {
    /// `clock + 1` on every event; inbound timestamps are ignored.
    Increment,
    /// `max(clock, inbound) + 1`, the Lamport rule.
    #[default]
    Lamport,
}

impl fmt::Display for ClockRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increment => write!(f, "increment"),
            Self::Lamport => write!(f, "lamport"),
        }
    }
}

impl FromStr for ClockRule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "increment" => Ok(Self::Increment),
            "lamport" => Ok(Self::Lamport),
            other => Err(format!(
                "unknown clock rule {other:?}, expected \"lamport\" or \"increment\""
            )),
        }
    }
}

/// Static configuration of one process.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// This process.
    pub self_id: ProcessId,
    /// Every member of the group, including `self_id`.
    pub party: Party,
    /// Clock update rule.
    pub clock_rule: ClockRule,
}

impl ProcessConfig {
    pub fn new(self_id: ProcessId, party: Party) -> Self {
        Self {
            self_id,
            party,
            clock_rule: ClockRule::default(),
        }
    }

    /// Set the clock update rule.
    #[must_use]
    pub fn with_clock_rule(mut self, clock_rule: ClockRule) -> Self {
        self.clock_rule = clock_rule;
        self
    }
}

/// Lifecycle of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Accepting inbound messages and issuing broadcasts.
    Running,
    /// Terminal.
    Stopped,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Why [`BroadcastProcess::run`] returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// The inbox saw no traffic within its idle window.
    Idle,
    /// The inbox was closed.
    InboxClosed,
    /// [`BroadcastProcess::stop`] was called.
    Stopped,
}

/// One member of a totally-ordered broadcast group.
///
/// Methods take `&mut self`: a process handles one event to completion before
/// the next, so no locking is needed around its queue or clock.
#[derive(Debug)]
pub struct BroadcastProcess<T> {
    config: ProcessConfig,
    clock: Timestamp,
    queue: PendingQueue,
    delivered: HashSet<MessageId>,
    delivery_log: Vec<MessageId>,
    /// Acks that arrived before their original.
    parked_acks: HashMap<MessageId, BTreeSet<ProcessId>>,
    state: ProcessState,
    transport: T,
    delivery_tx: Option<mpsc::UnboundedSender<Message>>,
}

impl<T: Transport> BroadcastProcess<T> {
    /// Create a process. `config.self_id` must belong to `config.party`.
    pub fn new(config: ProcessConfig, transport: T) -> Result<Self> {
        if !config.party.is_member(config.self_id) {
            return Err(Error::NotAMember(config.self_id));
        }
        Ok(Self {
            config,
            clock: 0,
            queue: PendingQueue::new(),
            delivered: HashSet::new(),
            delivery_log: Vec::new(),
            parked_acks: HashMap::new(),
            state: ProcessState::Running,
            transport,
            delivery_tx: None,
        })
    }

    /// Send every delivered message to `tx`, in delivery order.
    #[must_use]
    pub fn with_delivery_tx(mut self, tx: mpsc::UnboundedSender<Message>) -> Self {
        self.delivery_tx = Some(tx);
        self
    }

    pub fn self_id(&self) -> ProcessId {
        self.config.self_id
    }

    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    pub fn party(&self) -> &Party {
        &self.config.party
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Identity keys delivered so far, in delivery order.
    pub fn delivered_log(&self) -> &[MessageId] {
        &self.delivery_log
    }

    pub fn is_delivered(&self, id: &MessageId) -> bool {
        self.delivered.contains(id)
    }

    /// Acks held back because their original has not arrived yet.
    pub fn parked_acks(&self, id: &MessageId) -> Option<&BTreeSet<ProcessId>> {
        self.parked_acks.get(id)
    }

    /// Enter the terminal state.
    pub fn stop(&mut self) {
        if self.state == ProcessState::Running {
            info!(process = %self.self_id(), delivered = self.delivery_log.len(), "process stopped");
            self.state = ProcessState::Stopped;
        }
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state {
            ProcessState::Running => Ok(()),
            ProcessState::Stopped => Err(Error::Stopped(self.self_id())),
        }
    }

    /// Advance the clock for one event. Running out of timestamps stops the
    /// process: reusing one would give two broadcasts the same key.
    fn tick(&mut self, observed: Option<Timestamp>) -> Result<Timestamp> {
        let base = match (self.config.clock_rule, observed) {
            (ClockRule::Lamport, Some(remote)) => self.clock.max(remote),
            _ => self.clock,
        };
        match base.checked_add(1) {
            Some(next) => {
                self.clock = next;
                Ok(next)
            }
            None => {
                warn!(process = %self.self_id(), ?observed, "logical clock exhausted");
                self.stop();
                Err(Error::ClockExhausted(self.self_id()))
            }
        }
    }

    /// Broadcast `body` to the group as a new original message.
    ///
    /// Returns once the frame has been handed to the transport for every other
    /// member. Acknowledgments arrive later as separate events.
    pub async fn broadcast(&mut self, body: impl Into<String>) -> Result<MessageId> {
        self.ensure_running()?;
        let body = body.into();
        if let Some(tag) = reserved_tag(&body) {
            return Err(Error::ReservedBody { tag });
        }

        let self_id = self.self_id();
        let timestamp = self.tick(None)?;
        let msg = Message::original(self_id, timestamp, body);
        let id = msg.id();
        self.queue.enqueue(msg.clone(), self_id)?;
        debug!(process = %self_id, %id, "broadcasting");

        self.send_to_others(&msg).await?;
        self.attempt_deliver();
        Ok(id)
    }

    /// Handle one inbound frame. Returns the keys delivered as a result.
    ///
    /// A frame that does not decode is rejected before the clock moves.
    pub async fn on_receive(&mut self, raw: &[u8]) -> Result<Vec<MessageId>> {
        self.ensure_running()?;
        let msg = Message::decode(raw)?;
        self.tick(Some(msg.timestamp()))?;
        self.dispatch(msg).await
    }

    /// Inject an application payload, as if `app:{payload}` had arrived.
    pub async fn submit_application_message(
        &mut self,
        payload: impl Into<String>,
    ) -> Result<Vec<MessageId>> {
        self.ensure_running()?;
        let msg = Message::app_submission(self.self_id(), self.clock, payload);
        self.tick(None)?;
        self.dispatch(msg).await
    }

    async fn dispatch(&mut self, msg: Message) -> Result<Vec<MessageId>> {
        let before = self.delivery_log.len();
        match msg.kind() {
            MessageKind::Ack { of } => {
                let of = *of;
                self.record_ack(of, msg.sender());
                self.attempt_deliver();
            }
            MessageKind::AppSubmission { payload } => {
                let payload = payload.clone();
                self.broadcast(payload).await?;
            }
            MessageKind::Original { .. } => self.handle_original(msg).await?,
        }
        Ok(self.delivery_log[before..].to_vec())
    }

    async fn handle_original(&mut self, msg: Message) -> Result<()> {
        let self_id = self.self_id();
        let id = msg.id();
        if self.delivered.contains(&id) || self.queue.contains(&id) {
            debug!(process = %self_id, %id, "ignoring duplicate broadcast");
            return Ok(());
        }
        // Only members collect a full quorum; anything else would block the head.
        if !self.config.party.is_member(id.sender) {
            warn!(process = %self_id, %id, "dropping broadcast from non-member");
            return Ok(());
        }
        if id.sender == self_id {
            warn!(process = %self_id, %id, "dropping broadcast we never sent");
            return Ok(());
        }

        self.queue.enqueue(msg, id.sender)?;
        if let Some(ackers) = self.parked_acks.remove(&id) {
            debug!(process = %self_id, %id, parked = ackers.len(), "applying parked acks");
            for acker in ackers {
                self.queue.record_ack(id, acker)?;
            }
        }
        self.queue.record_ack(id, self_id)?;

        let ack = Message::ack(self_id, self.tick(None)?, id);
        trace!(process = %self_id, %id, "acknowledging");
        self.send_to_others(&ack).await?;
        self.attempt_deliver();
        Ok(())
    }

    fn record_ack(&mut self, of: MessageId, acker: ProcessId) {
        let self_id = self.self_id();
        if !self.config.party.is_member(acker) {
            warn!(process = %self_id, %of, %acker, "ignoring ack from non-member");
            return;
        }
        if self.delivered.contains(&of) {
            debug!(process = %self_id, %of, %acker, "late ack for delivered message");
            return;
        }
        if !self.config.party.is_member(of.sender) {
            warn!(process = %self_id, %of, %acker, "ignoring ack for non-member broadcast");
            return;
        }

        match self.queue.record_ack(of, acker) {
            Ok(true) => trace!(process = %self_id, %of, %acker, "ack recorded"),
            Ok(false) => debug!(process = %self_id, %of, %acker, "duplicate ack"),
            Err(QueueError::UnknownMessage(_)) if self.is_settled(&of) => {
                debug!(process = %self_id, %of, %acker, "ack for message that can no longer arrive");
            }
            Err(QueueError::UnknownMessage(_)) => {
                debug!(process = %self_id, %of, %acker, "ack for unknown message, parking");
                self.parked_acks.entry(of).or_default().insert(acker);
            }
            Err(e) => warn!(process = %self_id, %of, error = %e, "ack bookkeeping failed"),
        }
    }

    /// Deliver every message at the head of the queue whose quorum is
    /// complete. Returns the keys delivered by this call.
    pub fn attempt_deliver(&mut self) -> Vec<MessageId> {
        let mut delivered = Vec::new();
        loop {
            // EmptyQueue: nothing to do.
            let Ok(head) = self.queue.peek().map(Message::id) else {
                break;
            };
            if !self.queue.is_deliverable(&head, &self.config.party) {
                trace!(process = %self.self_id(), %head, "head awaiting acks");
                break;
            }
            let msg = match self.queue.dequeue() {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(process = %self.self_id(), error = %e, "dequeue failed");
                    break;
                }
            };

            self.delivered.insert(head);
            self.delivery_log.push(head);
            delivered.push(head);
            info!(process = %self.self_id(), id = %head, body = %msg.body(), "delivered");

            let closed = self
                .delivery_tx
                .as_ref()
                .is_some_and(|tx| tx.send(msg).is_err());
            if closed {
                debug!(process = %self.self_id(), "delivery subscriber dropped");
                self.delivery_tx = None;
            }
        }
        if !delivered.is_empty() {
            self.prune_parked_acks();
        }
        delivered
    }

    /// Whether an original with key `id` can still arrive.
    ///
    /// Under the Lamport rule with FIFO links, once a key is delivered every
    /// member has acked it, so no member can still have an older broadcast
    /// in flight to us. The increment rule gives no such bound.
    fn is_settled(&self, id: &MessageId) -> bool {
        self.config.clock_rule == ClockRule::Lamport
            && self.delivery_log.last().is_some_and(|last| id < last)
    }

    fn prune_parked_acks(&mut self) {
        let Some(&last) = self.delivery_log.last() else {
            return;
        };
        if self.config.clock_rule != ClockRule::Lamport {
            return;
        }
        let before = self.parked_acks.len();
        self.parked_acks.retain(|id, _| *id > last);
        let dropped = before - self.parked_acks.len();
        if dropped > 0 {
            debug!(process = %self.self_id(), dropped, %last, "dropped stale parked acks");
        }
    }

    async fn send_to_others(&mut self, msg: &Message) -> Result<()> {
        let self_id = self.self_id();
        let frame = msg.encode();
        let results = join_all(
            self.config
                .party
                .others(self_id)
                .map(|peer| self.transport.send_to(peer, frame.clone())),
        )
        .await;

        if let Some(err) = results.into_iter().find_map(|r| r.err()) {
            warn!(process = %self_id, peer = %err.peer, reason = %err.reason, "peer unreachable");
            self.stop();
            return Err(err.into());
        }
        Ok(())
    }

    /// Drive the process from `inbox` until it goes idle, is stopped, or a
    /// peer becomes unreachable.
    ///
    /// Malformed frames and acknowledgment bookkeeping problems are logged and
    /// skipped. A send failure ends the loop with that error.
    pub async fn run<I: Inbox>(&mut self, inbox: &mut I) -> Result<Shutdown> {
        info!(
            process = %self.self_id(),
            party = self.config.party.len(),
            clock_rule = %self.config.clock_rule,
            "process running"
        );

        while self.state == ProcessState::Running {
            let frame = match inbox.receive_next().await {
                Ok(frame) => frame,
                Err(InboxError::Timeout(idle)) => {
                    info!(process = %self.self_id(), ?idle, "inbox idle, shutting down");
                    self.stop();
                    return Ok(Shutdown::Idle);
                }
                Err(InboxError::Closed) => {
                    self.stop();
                    return Ok(Shutdown::InboxClosed);
                }
                Err(e) => {
                    self.stop();
                    return Err(e.into());
                }
            };

            match self.on_receive(&frame).await {
                Ok(_) => {}
                Err(Error::Malformed(reason)) => {
                    warn!(process = %self.self_id(), %reason, "dropping malformed message");
                }
                Err(e @ (Error::Queue(_) | Error::ReservedBody { .. })) => {
                    warn!(process = %self.self_id(), error = %e, "event dropped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Shutdown::Stopped)
    }
}
