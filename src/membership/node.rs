//! Membership Node
//!
//! Glues the join protocol, membership table, failure detector and gossip
//! disseminator into one per-node state machine driven by `tick`.
//!
//! A tick runs to completion without awaiting anything:
//! 1. drain and decode every queued message, dispatching it to the join
//!    protocol (which merges into the table);
//! 2. if the node is a member, sweep the failure detector;
//! 3. if the node is a member, gossip the table to random peers.

use bytes::Bytes;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::sync::Arc;

use super::codec;
use super::detector::FailureDetector;
use super::gossip::GossipDisseminator;
use super::join::JoinProtocol;
use super::log::MembershipLog;
use super::table::MembershipTable;
use super::types::{GossipMessage, JoinState, MembershipEntry, NodeId, Tick};
use crate::config::Config;
use crate::error::BootstrapError;
use crate::transport::Transport;

/// What happened during one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub received: usize,
    pub malformed: usize,
    pub suspected: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub gossip_sent: usize,
}

/// Point-in-time copy of a node's state, for status endpoints and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipView {
    pub node: NodeId,
    pub state: JoinState,
    pub tick: Tick,
    pub heartbeat: i64,
    pub members: Vec<MembershipEntry>,
}

impl MembershipView {
    pub fn alive_count(&self) -> usize {
        self.members.iter().filter(|entry| !entry.is_suspect()).count()
    }
}

/// Running counters, kept for the lifetime of the node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub ticks: u64,
    pub received: u64,
    pub malformed: u64,
    pub sent: u64,
    pub send_failures: u64,
}

pub struct MembershipNode {
    id: NodeId,
    table: MembershipTable,
    join: JoinProtocol,
    detector: FailureDetector,
    disseminator: GossipDisseminator,
    transport: Arc<dyn Transport>,
    log: Arc<dyn MembershipLog>,
    rng: StdRng,
    failed: bool,
    last_tick: Tick,
    stats: NodeStats,
}

impl MembershipNode {
    /// Builds a node in the `Uninitialized` state.
    ///
    /// Fails if `id` cannot identify a member or if `config` is invalid; both
    /// should abort startup.
    pub fn new(
        id: NodeId,
        config: &Config,
        transport: Arc<dyn Transport>,
        log: Arc<dyn MembershipLog>,
    ) -> Result<Self, BootstrapError> {
        if !id.is_routable() {
            return Err(BootstrapError::InvalidLocalAddress(id));
        }
        config.validate()?;

        Ok(Self {
            id,
            table: MembershipTable::new(id, 0),
            join: JoinProtocol::new(config.introducer),
            detector: config.detector(),
            disseminator: config.disseminator(),
            transport,
            log,
            rng: StdRng::from_entropy(),
            failed: false,
            last_tick: 0,
            stats: NodeStats::default(),
        })
    }

    /// Replaces the peer-selection RNG, for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Initializes the table with the local entry and starts the join.
    pub fn start(&mut self, now: Tick) {
        if self.join.state() != JoinState::Uninitialized {
            tracing::debug!("{} already started", self.id);
            return;
        }

        self.table = MembershipTable::new(self.id, now);
        self.last_tick = now;
        self.log.record_join(self.id, self.id);

        if let Some((introducer, request)) = self.join.bootstrap(&self.table) {
            self.send(introducer, &request);
        }
    }

    /// Runs one protocol round at local time `now`.
    pub fn tick(&mut self, now: Tick) -> TickReport {
        let mut report = TickReport::default();
        if self.failed || self.join.state() == JoinState::Uninitialized {
            return report;
        }

        self.last_tick = now;
        self.stats.ticks += 1;

        for payload in self.transport.drain_inbound() {
            report.received += 1;
            if !self.receive(&payload, now) {
                report.malformed += 1;
            }
        }

        if !self.join.is_member() {
            return report;
        }

        let sweep = self.detector.sweep(&mut self.table, now, self.log.as_ref());
        report.suspected = sweep.suspected;
        report.removed = sweep.removed;

        if let Some((targets, msg)) = self.disseminator.round(&self.table, &mut self.rng) {
            if let Some(payload) = self.encode(&msg) {
                for target in targets {
                    tracing::trace!("{} gossiping to {}", self.id, target);
                    if self.send_payload(target, payload.clone()) {
                        report.gossip_sent += 1;
                    }
                }
            }
        }

        report
    }

    /// Decodes and dispatches one payload. Returns `false` if it was malformed.
    pub fn receive(&mut self, payload: &[u8], now: Tick) -> bool {
        self.stats.received += 1;

        let msg = match codec::decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!("{} dropping malformed message: {}", self.id, e);
                return false;
            }
        };

        self.handle_message(msg, now);
        true
    }

    pub fn handle_message(&mut self, msg: GossipMessage, now: Tick) {
        let log = self.log.as_ref();

        match msg {
            GossipMessage::JoinRequest { sender, members } => {
                tracing::debug!("{} received join request from {}", self.id, sender);
                if let Some((dst, reply)) =
                    self.join
                        .on_join_request(&mut self.table, sender, &members, now, log)
                {
                    self.send(dst, &reply);
                }
            }

            GossipMessage::JoinReply { sender, members } => {
                tracing::debug!("{} received join reply from {}", self.id, sender);
                self.join
                    .on_join_reply(&mut self.table, sender, &members, now, log);
            }

            GossipMessage::Gossip { sender, members } => {
                tracing::trace!(
                    "{} received gossip from {} with {} members",
                    self.id,
                    sender,
                    members.len()
                );
                self.join
                    .on_gossip(&mut self.table, sender, &members, now, log);
            }
        }
    }

    /// Simulates a crash: every later tick is a no-op.
    pub fn fail(&mut self) {
        tracing::info!("{} failed", self.id);
        self.failed = true;
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn introducer(&self) -> NodeId {
        self.join.introducer()
    }

    pub fn join_state(&self) -> JoinState {
        self.join.state()
    }

    pub fn is_member(&self) -> bool {
        self.join.is_member()
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    pub fn heartbeat(&self) -> i64 {
        self.table.local_heartbeat()
    }

    pub fn get_member(&self, id: &NodeId) -> Option<MembershipEntry> {
        self.table.get(id).copied()
    }

    pub fn alive_members(&self) -> Vec<MembershipEntry> {
        self.table.alive()
    }

    pub fn suspected_members(&self) -> Vec<MembershipEntry> {
        self.table.suspected()
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    pub fn view(&self) -> MembershipView {
        MembershipView {
            node: self.id,
            state: self.join.state(),
            tick: self.last_tick,
            heartbeat: self.heartbeat(),
            members: self.table.entries().copied().collect(),
        }
    }

    fn send(&mut self, dst: NodeId, msg: &GossipMessage) {
        if let Some(payload) = self.encode(msg) {
            self.send_payload(dst, payload);
        }
    }

    fn encode(&self, msg: &GossipMessage) -> Option<Bytes> {
        match codec::encode(msg) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!("{} cannot encode {:?}: {}", self.id, msg.kind(), e);
                None
            }
        }
    }

    fn send_payload(&mut self, dst: NodeId, payload: Bytes) -> bool {
        match self.transport.send(dst, payload) {
            Ok(()) => {
                self.stats.sent += 1;
                true
            }
            Err(e) => {
                self.stats.send_failures += 1;
                tracing::debug!("{} failed to send to {}: {}", self.id, dst, e);
                false
            }
        }
    }
}
