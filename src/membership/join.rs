//! Join Protocol
//!
//! `Uninitialized -> Joining -> Member`. A new node sends its own entry to the
//! introducer; the introducer merges it and answers with its whole table.
//! There is no retry: if the reply is lost the joiner waits for gossip.

use super::log::MembershipLog;
use super::table::{MembershipTable, MergeOutcome};
use super::types::{GossipMessage, JoinState, NodeId, Tick, WireEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinProtocol {
    introducer: NodeId,
    state: JoinState,
}

impl JoinProtocol {
    pub fn new(introducer: NodeId) -> Self {
        Self {
            introducer,
            state: JoinState::Uninitialized,
        }
    }

    pub fn introducer(&self) -> NodeId {
        self.introducer
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    pub fn is_member(&self) -> bool {
        self.state == JoinState::Member
    }

    /// Leaves `Uninitialized`.
    ///
    /// The introducer founds the group and is a member straight away; anyone
    /// else gets back the `JoinRequest` to send to the introducer.
    pub fn bootstrap(&mut self, table: &MembershipTable) -> Option<(NodeId, GossipMessage)> {
        if self.state != JoinState::Uninitialized {
            return None;
        }

        let local_id = table.local_id();
        if local_id == self.introducer {
            tracing::info!("{} is the introducer, starting up group", local_id);
            self.state = JoinState::Member;
            return None;
        }

        tracing::info!("{} trying to join via {}", local_id, self.introducer);
        self.state = JoinState::Joining;

        let own_entry = table
            .get(&local_id)
            .map(|entry| vec![entry.wire()])
            .unwrap_or_default();
        let request = GossipMessage::JoinRequest {
            sender: local_id,
            members: own_entry,
        };
        Some((self.introducer, request))
    }

    /// Merges a joiner's entry; a member answers with its table.
    ///
    /// A node still joining merges but does not answer, since its own view
    /// is incomplete.
    pub fn on_join_request(
        &mut self,
        table: &mut MembershipTable,
        sender: NodeId,
        members: &[WireEntry],
        now: Tick,
        log: &dyn MembershipLog,
    ) -> Option<(NodeId, GossipMessage)> {
        table.merge(members, now, log);

        if !self.is_member() {
            tracing::debug!("Not a member yet, ignoring join request from {}", sender);
            return None;
        }

        let reply = GossipMessage::JoinReply {
            sender: table.local_id(),
            members: table.snapshot(),
        };
        Some((sender, reply))
    }

    /// Merges the introducer's table and completes the join.
    ///
    /// Duplicate replies are plain merges.
    pub fn on_join_reply(
        &mut self,
        table: &mut MembershipTable,
        sender: NodeId,
        members: &[WireEntry],
        now: Tick,
        log: &dyn MembershipLog,
    ) -> MergeOutcome {
        let outcome = table.merge(members, now, log);
        self.promote(table.local_id(), sender, now);
        outcome
    }

    /// Merges a peer's gossip.
    ///
    /// Gossip only reaches nodes that are already in someone's table, so a
    /// joining node that receives it is treated as admitted.
    pub fn on_gossip(
        &mut self,
        table: &mut MembershipTable,
        sender: NodeId,
        members: &[WireEntry],
        now: Tick,
        log: &dyn MembershipLog,
    ) -> MergeOutcome {
        let outcome = table.merge(members, now, log);
        self.promote(table.local_id(), sender, now);
        outcome
    }

    fn promote(&mut self, local_id: NodeId, via: NodeId, now: Tick) {
        if self.state == JoinState::Joining {
            tracing::info!("{} joined the group via {} at tick {}", local_id, via, now);
            self.state = JoinState::Member;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::log::RecordingLog;

    const INTRODUCER: NodeId = NodeId::localhost(7000);
    const JOINER: NodeId = NodeId::localhost(7001);

    #[test]
    fn test_introducer_bootstraps_group() {
        let table = MembershipTable::new(INTRODUCER, 0);
        let mut join = JoinProtocol::new(INTRODUCER);

        assert!(join.bootstrap(&table).is_none());
        assert_eq!(join.state(), JoinState::Member);
    }

    #[test]
    fn test_joiner_sends_own_entry_to_introducer() {
        let table = MembershipTable::new(JOINER, 3);
        let mut join = JoinProtocol::new(INTRODUCER);

        let (dst, msg) = join.bootstrap(&table).unwrap();

        assert_eq!(dst, INTRODUCER);
        assert_eq!(join.state(), JoinState::Joining);
        assert_eq!(
            msg,
            GossipMessage::JoinRequest {
                sender: JOINER,
                members: vec![WireEntry::new(JOINER, 0)],
            }
        );
        assert!(join.bootstrap(&table).is_none(), "bootstrap happens once");
    }

    #[test]
    fn test_member_replies_with_merged_table() {
        let log = RecordingLog::new();
        let mut table = MembershipTable::new(INTRODUCER, 0);
        let mut join = JoinProtocol::new(INTRODUCER);
        join.bootstrap(&table);

        let (dst, reply) = join
            .on_join_request(&mut table, JOINER, &[WireEntry::new(JOINER, 0)], 1, &log)
            .unwrap();

        assert_eq!(dst, JOINER);
        assert_eq!(reply.sender(), INTRODUCER);
        assert_eq!(
            reply.members(),
            &[WireEntry::new(INTRODUCER, 0), WireEntry::new(JOINER, 0)]
        );
        assert_eq!(log.joins_seen_by(INTRODUCER), vec![JOINER]);
    }

    #[test]
    fn test_joining_node_does_not_answer_join_requests() {
        let log = RecordingLog::new();
        let other = NodeId::localhost(7002);
        let mut table = MembershipTable::new(JOINER, 0);
        let mut join = JoinProtocol::new(INTRODUCER);
        join.bootstrap(&table);

        let reply = join.on_join_request(&mut table, other, &[WireEntry::new(other, 0)], 1, &log);

        assert!(reply.is_none());
        assert!(table.contains(&other));
    }

    #[test]
    fn test_reply_completes_join_once() {
        let log = RecordingLog::new();
        let mut table = MembershipTable::new(JOINER, 0);
        let mut join = JoinProtocol::new(INTRODUCER);
        join.bootstrap(&table);
        let members = [WireEntry::new(INTRODUCER, 4), WireEntry::new(JOINER, 0)];

        let first = join.on_join_reply(&mut table, INTRODUCER, &members, 2, &log);
        assert_eq!(join.state(), JoinState::Member);
        assert_eq!(first.inserted, vec![INTRODUCER]);

        let second = join.on_join_reply(&mut table, INTRODUCER, &members, 3, &log);
        assert_eq!(join.state(), JoinState::Member);
        assert!(second.is_noop());
    }

    #[test]
    fn test_gossip_admits_joining_node() {
        let log = RecordingLog::new();
        let mut table = MembershipTable::new(JOINER, 0);
        let mut join = JoinProtocol::new(INTRODUCER);
        join.bootstrap(&table);

        join.on_gossip(&mut table, INTRODUCER, &[WireEntry::new(INTRODUCER, 9)], 5, &log);

        assert!(join.is_member());
        assert_eq!(table.get(&INTRODUCER).unwrap().heartbeat, 9);
    }
}
