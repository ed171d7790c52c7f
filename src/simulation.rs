//! In-Process Cluster Simulation
//!
//! Runs a whole group on a `MemoryNetwork` under one global clock. Node 0 is
//! the introducer. Every step ticks each live node once, in index order, so a
//! run is fully reproducible for a given seed.
//!
//! Supports the fault model the protocol is designed for: random message loss
//! (`drop_rate`) and crash-stop failures injected at any tick.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{BootstrapError, ConfigError};
use crate::membership::log::{MembershipEvent, RecordingLog};
use crate::membership::node::{MembershipNode, MembershipView};
use crate::membership::types::{NodeId, Tick};
use crate::transport::MemoryNetwork;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub nodes: usize,
    pub base_port: u16,
    pub drop_rate: f64,
    pub seed: u64,
    pub suspect_timeout: Tick,
    pub remove_timeout: Tick,
    pub fanout: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let defaults = Config::default();
        Self {
            nodes: 5,
            base_port: 7000,
            drop_rate: 0.0,
            seed: 0,
            suspect_timeout: defaults.suspect_timeout,
            remove_timeout: defaults.remove_timeout,
            fanout: defaults.fanout,
        }
    }
}

impl SimulationConfig {
    fn node_config(&self) -> Config {
        Config {
            introducer: NodeId::localhost(self.base_port),
            suspect_timeout: self.suspect_timeout,
            remove_timeout: self.remove_timeout,
            fanout: self.fanout,
            ..Default::default()
        }
    }
}

pub struct Simulation {
    network: Arc<MemoryNetwork>,
    nodes: Vec<MembershipNode>,
    log: Arc<RecordingLog>,
    now: Tick,
}

impl Simulation {
    /// Creates every node in `Uninitialized`; nothing is sent yet.
    pub fn new(config: &SimulationConfig) -> Result<Self, BootstrapError> {
        let node_config = config.node_config();
        node_config.validate()?;

        let network = MemoryNetwork::lossy(config.drop_rate, config.seed);
        let log = Arc::new(RecordingLog::new());

        let mut nodes = Vec::with_capacity(config.nodes);
        for index in 0..config.nodes {
            let port = u16::try_from(config.base_port as usize + index).map_err(|_| {
                ConfigError::Invalid(format!(
                    "{} nodes do not fit above port {}",
                    config.nodes, config.base_port
                ))
            })?;
            let id = NodeId::localhost(port);
            let transport = Arc::new(network.register(id));
            let node = MembershipNode::new(id, &node_config, transport, log.clone())?
                .with_seed(config.seed.wrapping_add(index as u64));
            nodes.push(node);
        }

        Ok(Self {
            network,
            nodes,
            log,
            now: 0,
        })
    }

    /// Starts every node at the current tick, introducer first.
    pub fn start_all(&mut self) {
        let now = self.now;
        for node in &mut self.nodes {
            node.start(now);
        }
    }

    pub fn start_node(&mut self, index: usize) {
        let now = self.now;
        if let Some(node) = self.nodes.get_mut(index) {
            node.start(now);
        }
    }

    /// Advances the clock by one tick and ticks every node.
    pub fn step(&mut self) {
        self.now += 1;
        let now = self.now;
        for node in &mut self.nodes {
            node.tick(now);
        }
    }

    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Crash-stops a node: it stops ticking and its inbox is closed.
    pub fn fail(&mut self, index: usize) {
        if let Some(node) = self.nodes.get_mut(index) {
            node.fail();
            self.network.close(&node.id());
        }
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &MembershipNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[MembershipNode] {
        &self.nodes
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(MembershipNode::id).collect()
    }

    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    pub fn events(&self) -> Vec<MembershipEvent> {
        self.log.events()
    }

    pub fn log(&self) -> &RecordingLog {
        &self.log
    }

    pub fn views(&self) -> Vec<MembershipView> {
        self.nodes.iter().map(MembershipNode::view).collect()
    }

    /// Live members of the group: started, not crashed, done joining.
    pub fn live_members(&self) -> BTreeSet<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.is_member() && !node.is_failed())
            .map(MembershipNode::id)
            .collect()
    }

    /// True when every live member lists exactly the live members, all with
    /// a non-negative heartbeat.
    pub fn converged(&self) -> bool {
        let expected = self.live_members();
        self.nodes
            .iter()
            .filter(|node| expected.contains(&node.id()))
            .all(|node| {
                let alive: BTreeSet<NodeId> =
                    node.alive_members().iter().map(|entry| entry.id).collect();
                alive == expected && node.suspected_members().is_empty()
            })
    }
}
