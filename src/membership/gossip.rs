//! Gossip Disseminator
//!
//! Every tick a member sends its full live table to `fanout` peers picked at
//! random (with replacement). Delivery is never acknowledged; repetition and
//! random mixing are what make views converge.

use rand::Rng;

use super::table::MembershipTable;
use super::types::{GossipMessage, NodeId};

pub const DEFAULT_FANOUT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GossipDisseminator {
    fanout: usize,
}

impl Default for GossipDisseminator {
    fn default() -> Self {
        Self::new(DEFAULT_FANOUT)
    }
}

impl GossipDisseminator {
    pub fn new(fanout: usize) -> Self {
        Self { fanout }
    }

    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Picks up to `fanout` gossip targets, never the local node.
    ///
    /// A pick that lands on a suspected entry is redrawn, at most once per
    /// candidate; if every redraw hits a suspect the slot is left empty.
    /// Duplicates are possible since picks are independent.
    pub fn select_peers<R: Rng>(&self, table: &MembershipTable, rng: &mut R) -> Vec<NodeId> {
        let candidates: Vec<_> = table.peers().collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut targets = Vec::with_capacity(self.fanout);
        for _ in 0..self.fanout {
            for _ in 0..candidates.len() {
                let pick = candidates[rng.gen_range(0..candidates.len())];
                if !pick.is_suspect() {
                    targets.push(pick.id);
                    break;
                }
            }
        }
        targets
    }

    /// Builds one round of gossip: the target list and the message every
    /// target receives.
    pub fn round<R: Rng>(
        &self,
        table: &MembershipTable,
        rng: &mut R,
    ) -> Option<(Vec<NodeId>, GossipMessage)> {
        let targets = self.select_peers(table, rng);
        if targets.is_empty() {
            return None;
        }

        let msg = GossipMessage::Gossip {
            sender: table.local_id(),
            members: table.snapshot(),
        };
        Some((targets, msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::log::RecordingLog;
    use crate::membership::types::WireEntry;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn table_with(peers: &[(u16, i64)]) -> MembershipTable {
        let log = RecordingLog::new();
        let mut table = MembershipTable::new(NodeId::localhost(7000), 0);
        let incoming: Vec<_> = peers
            .iter()
            .map(|(port, hb)| WireEntry::new(NodeId::localhost(*port), (*hb).max(0)))
            .collect();
        table.merge(&incoming, 0, &log);
        for (port, hb) in peers {
            if *hb < 0 {
                table.suspect(&NodeId::localhost(*port));
            }
        }
        table
    }

    #[test]
    fn test_lonely_node_selects_nobody() {
        let mut rng = StdRng::seed_from_u64(1);
        let table = table_with(&[]);

        assert!(GossipDisseminator::new(4).select_peers(&table, &mut rng).is_empty());
        assert!(GossipDisseminator::new(4).round(&table, &mut rng).is_none());
    }

    #[test]
    fn test_selection_fills_fanout_and_skips_self() {
        let mut rng = StdRng::seed_from_u64(7);
        let table = table_with(&[(7001, 1), (7002, 1), (7003, 1)]);

        let targets = GossipDisseminator::new(4).select_peers(&table, &mut rng);

        assert_eq!(targets.len(), 4);
        assert!(!targets.contains(&NodeId::localhost(7000)));
    }

    #[test]
    fn test_selection_terminates_when_all_peers_suspected() {
        let mut rng = StdRng::seed_from_u64(3);
        let table = table_with(&[(7001, -1), (7002, -1)]);

        assert!(GossipDisseminator::new(8).select_peers(&table, &mut rng).is_empty());
    }

    #[test]
    fn test_selection_prefers_live_peers() {
        let mut rng = StdRng::seed_from_u64(11);
        let table = table_with(&[(7001, -1), (7002, 5), (7003, -1)]);

        let targets = GossipDisseminator::new(16).select_peers(&table, &mut rng);

        // Each slot gets three draws, so most slots find the single live peer.
        assert!(!targets.is_empty());
        assert!(targets.iter().all(|id| *id == NodeId::localhost(7002)));
    }

    #[test]
    fn test_round_omits_suspected_entries() {
        let mut rng = StdRng::seed_from_u64(5);
        let table = table_with(&[(7001, 2), (7002, -1)]);

        let (_, msg) = GossipDisseminator::new(8).round(&table, &mut rng).unwrap();

        let ids: Vec<_> = msg.members().iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![NodeId::localhost(7000), NodeId::localhost(7001)]);
        assert_eq!(msg.sender(), NodeId::localhost(7000));
    }
}
