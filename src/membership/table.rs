//! Membership Table
//!
//! The authoritative, single-writer view a node keeps of the group. Only the
//! owning node's tick mutates it, so there is no interior locking.

use std::collections::BTreeMap;

use super::log::MembershipLog;
use super::types::{MembershipEntry, NodeId, SUSPECT_HEARTBEAT, Tick, WireEntry};

/// What a single `merge` call changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: Vec<NodeId>,
    pub refreshed: usize,
}

impl MergeOutcome {
    pub fn is_noop(&self) -> bool {
        self.inserted.is_empty() && self.refreshed == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipTable {
    local_id: NodeId,
    entries: BTreeMap<NodeId, MembershipEntry>,
}

impl MembershipTable {
    /// Creates a table holding only the local node, at heartbeat 0.
    pub fn new(local_id: NodeId, now: Tick) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(local_id, MembershipEntry::new(local_id, 0, now));
        Self { local_id, entries }
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&MembershipEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.entries.contains_key(id)
    }

    /// All entries in `NodeId` order, self included.
    pub fn entries(&self) -> impl Iterator<Item = &MembershipEntry> {
        self.entries.values()
    }

    /// Every entry except the local one.
    pub fn peers(&self) -> impl Iterator<Item = &MembershipEntry> {
        let local_id = self.local_id;
        self.entries.values().filter(move |entry| entry.id != local_id)
    }

    pub fn local_heartbeat(&self) -> i64 {
        self.entries
            .get(&self.local_id)
            .map(|entry| entry.heartbeat)
            .unwrap_or_default()
    }

    /// Folds a received table into this one.
    ///
    /// Suspected entries in `incoming` are skipped, unknown ids are inserted
    /// with the receiver's clock, and known live ids only move forward.
    /// A local suspect is never revived and the local entry is never touched.
    pub fn merge(
        &mut self,
        incoming: &[WireEntry],
        now: Tick,
        log: &dyn MembershipLog,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for remote in incoming {
            if remote.heartbeat < 0 || remote.id == self.local_id {
                continue;
            }

            match self.entries.get_mut(&remote.id) {
                Some(existing) => {
                    if existing.heartbeat >= 0 && existing.heartbeat < remote.heartbeat {
                        tracing::trace!(
                            "Updating {}: heartbeat {} -> {}",
                            remote.id,
                            existing.heartbeat,
                            remote.heartbeat
                        );
                        existing.heartbeat = remote.heartbeat;
                        existing.last_updated = now;
                        outcome.refreshed += 1;
                    }
                }
                None => {
                    if !remote.id.is_routable() {
                        tracing::debug!("Ignoring unroutable member {}", remote.id);
                        continue;
                    }
                    self.entries.insert(
                        remote.id,
                        MembershipEntry::new(remote.id, remote.heartbeat, now),
                    );
                    log.record_join(self.local_id, remote.id);
                    outcome.inserted.push(remote.id);
                }
            }
        }

        outcome
    }

    /// Advances the local heartbeat by one and returns the new value.
    pub fn beat(&mut self, now: Tick) -> i64 {
        let local_id = self.local_id;
        let entry = self
            .entries
            .entry(local_id)
            .or_insert_with(|| MembershipEntry::new(local_id, 0, now));
        entry.heartbeat += 1;
        entry.last_updated = now;
        entry.heartbeat
    }

    /// Marks a peer as suspected. Returns `true` only on the first marking.
    pub fn suspect(&mut self, id: &NodeId) -> bool {
        if *id == self.local_id {
            return false;
        }
        match self.entries.get_mut(id) {
            Some(entry) if !entry.is_suspect() => {
                entry.heartbeat = SUSPECT_HEARTBEAT;
                true
            }
            _ => false,
        }
    }

    /// Drops a peer. The local entry cannot be removed.
    pub fn remove(&mut self, id: &NodeId) -> Option<MembershipEntry> {
        if *id == self.local_id {
            return None;
        }
        self.entries.remove(id)
    }

    /// Value copy of every live entry, ready to put on the wire.
    ///
    /// Suspected entries are left out so that a failed node is not spread
    /// further by gossip.
    pub fn snapshot(&self) -> Vec<WireEntry> {
        self.entries
            .values()
            .filter(|entry| !entry.is_suspect())
            .map(MembershipEntry::wire)
            .collect()
    }

    pub fn alive(&self) -> Vec<MembershipEntry> {
        self.entries
            .values()
            .filter(|entry| !entry.is_suspect())
            .copied()
            .collect()
    }

    pub fn suspected(&self) -> Vec<MembershipEntry> {
        self.entries
            .values()
            .filter(|entry| entry.is_suspect())
            .copied()
            .collect()
    }
}
