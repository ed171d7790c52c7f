//! Membership event sinks.
//!
//! The protocol reports every table insertion and eviction through a
//! `MembershipLog`. Implementations must not fail or block the caller.

use serde::Serialize;
use std::sync::Mutex;

use super::types::NodeId;

pub trait MembershipLog: Send + Sync {
    fn record_join(&self, observer: NodeId, joined: NodeId);
    fn record_leave(&self, observer: NodeId, left: NodeId);
}

/// Writes membership changes as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl MembershipLog for TracingLog {
    fn record_join(&self, observer: NodeId, joined: NodeId) {
        tracing::info!(%observer, %joined, "Node joined");
    }

    fn record_leave(&self, observer: NodeId, left: NodeId) {
        tracing::info!(%observer, %left, "Node removed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MembershipEvent {
    Joined { observer: NodeId, node: NodeId },
    Left { observer: NodeId, node: NodeId },
}

/// Keeps every event in memory, in arrival order.
///
/// Shared by all nodes of a `Simulation` so tests can assert on the
/// group-wide history.
#[derive(Debug, Default)]
pub struct RecordingLog {
    events: Mutex<Vec<MembershipEvent>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MembershipEvent> {
        self.lock().clone()
    }

    pub fn joins_seen_by(&self, observer: NodeId) -> Vec<NodeId> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                MembershipEvent::Joined { observer: o, node } if *o == observer => Some(*node),
                _ => None,
            })
            .collect()
    }

    pub fn leaves_seen_by(&self, observer: NodeId) -> Vec<NodeId> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                MembershipEvent::Left { observer: o, node } if *o == observer => Some(*node),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: MembershipEvent) {
        self.lock().push(event);
    }

    // A poisoned lock only means a test thread panicked mid-push; the log is still usable.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MembershipEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MembershipLog for RecordingLog {
    fn record_join(&self, observer: NodeId, joined: NodeId) {
        self.push(MembershipEvent::Joined {
            observer,
            node: joined,
        });
    }

    fn record_leave(&self, observer: NodeId, left: NodeId) {
        self.push(MembershipEvent::Left {
            observer,
            node: left,
        });
    }
}
