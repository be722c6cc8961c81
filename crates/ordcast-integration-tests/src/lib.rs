//! Group-level test support for ordcast.
//!
//! [`Simulation`] runs a whole group inside one task. Outbound frames are
//! captured by [`RecordingTransport`] and queued per directed link; each step
//! picks a busy link with a seeded RNG and hands its head frame to the
//! receiver. Frames on one link stay FIFO, as they would over TCP, while
//! arrival order across links is arbitrary. The same seed always replays the
//! same interleaving.

use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;
use ordcast_core::memory::RecordingTransport;
use ordcast_core::{
    BroadcastProcess, ClockRule, Error, Message, MessageId, Party, ProcessConfig, ProcessId,
    Result,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

/// Counters collected while a simulation runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationStats {
    /// Broadcasts issued through [`Simulation::broadcast`]
    pub broadcasts: usize,
    /// Frames handed to a process, submissions included
    pub frames_received: usize,
    /// Events after which a process clock failed to advance
    pub clock_regressions: usize,
}

type Link = (ProcessId, ProcessId);

/// A seeded, single-task run of a whole group.
pub struct Simulation {
    processes: BTreeMap<ProcessId, BroadcastProcess<RecordingTransport>>,
    links: BTreeMap<Link, VecDeque<Bytes>>,
    rng: ChaCha8Rng,
    stats: SimulationStats,
}

impl Simulation {
    /// A group of processes `1..=size`.
    pub fn new(size: u64, clock_rule: ClockRule, seed: u64) -> Result<Self> {
        let party: Party = (1..=size).map(ProcessId).collect();
        let processes: BTreeMap<_, _> = party
            .members()
            .map(|id| {
                let config = ProcessConfig::new(id, party.clone()).with_clock_rule(clock_rule);
                Ok((id, BroadcastProcess::new(config, RecordingTransport::new())?))
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            processes,
            links: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            stats: SimulationStats::default(),
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.processes.keys().copied()
    }

    pub fn process(&self, id: ProcessId) -> Option<&BroadcastProcess<RecordingTransport>> {
        self.processes.get(&id)
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Frames queued on all links.
    pub fn in_flight(&self) -> usize {
        self.links.values().map(VecDeque::len).sum()
    }

    /// Messages still queued across all processes.
    pub fn pending(&self) -> usize {
        self.processes.values().map(|p| p.queue().len()).sum()
    }

    /// Delivery sequence of every process.
    pub fn logs(&self) -> BTreeMap<ProcessId, Vec<MessageId>> {
        self.processes
            .iter()
            .map(|(&id, p)| (id, p.delivered_log().to_vec()))
            .collect()
    }

    /// Broadcast `body` from `from`.
    pub async fn broadcast(&mut self, from: ProcessId, body: &str) -> Result<MessageId> {
        let process = self
            .processes
            .get_mut(&from)
            .ok_or(Error::NotAMember(from))?;
        let id = process.broadcast(body).await?;
        self.stats.broadcasts += 1;
        self.collect(from);
        Ok(id)
    }

    /// Submit an application payload to `to`, as its local driver would.
    pub async fn submit(&mut self, to: ProcessId, payload: &str) -> Result<()> {
        let frame = Message::app_submission(to, 0, payload).encode();
        self.receive(to, &frame).await
    }

    /// Deliver the head frame of one randomly chosen busy link.
    /// Returns `false` once nothing is in flight.
    pub async fn step(&mut self) -> Result<bool> {
        let busy: Vec<Link> = self
            .links
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(&link, _)| link)
            .collect();
        let Some(&(from, to)) = busy.choose(&mut self.rng) else {
            return Ok(false);
        };
        let Some(frame) = self.links.get_mut(&(from, to)).and_then(VecDeque::pop_front) else {
            return Ok(false);
        };

        trace!(%from, %to, "simulated delivery");
        self.receive(to, &frame).await?;
        Ok(true)
    }

    /// Step until nothing is in flight. Returns the number of steps.
    pub async fn settle(&mut self) -> Result<usize> {
        let mut steps = 0;
        while self.step().await? {
            steps += 1;
        }
        Ok(steps)
    }

    /// Every process broadcasts `per_process` bodies. Broadcasts and link
    /// deliveries are interleaved at random, then the group settles.
    pub async fn run_workload(&mut self, per_process: usize) -> Result<()> {
        let mut remaining: Vec<(ProcessId, usize)> = self.ids().map(|id| (id, 0)).collect();

        loop {
            remaining.retain(|&(_, sent)| sent < per_process);
            let deliver = self.in_flight() > 0 && (remaining.is_empty() || self.rng.gen_bool(0.6));

            if deliver {
                self.step().await?;
                continue;
            }
            if remaining.is_empty() {
                break;
            }

            let slot = self.rng.gen_range(0..remaining.len());
            let (id, sent) = remaining[slot];
            self.broadcast(id, &format!("m{sent}-from-{id}")).await?;
            remaining[slot].1 += 1;
        }
        Ok(())
    }

    async fn receive(&mut self, to: ProcessId, frame: &[u8]) -> Result<()> {
        let process = self.processes.get_mut(&to).ok_or(Error::NotAMember(to))?;
        let before = process.clock();
        process.on_receive(frame).await?;
        if process.clock() <= before {
            self.stats.clock_regressions += 1;
        }
        self.stats.frames_received += 1;
        self.collect(to);
        Ok(())
    }

    fn collect(&mut self, from: ProcessId) {
        let Some(process) = self.processes.get(&from) else {
            return;
        };
        for (to, frame) in process.transport().take() {
            self.links.entry((from, to)).or_default().push_back(frame);
        }
    }
}
