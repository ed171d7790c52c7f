//! Heartbeat Failure Detector
//!
//! Two-stage timeout policy applied to every table entry once per tick:
//! after `suspect_timeout` ticks of silence an entry stops being gossiped,
//! after `remove_timeout` ticks it is dropped from the table.

use super::log::MembershipLog;
use super::table::MembershipTable;
use super::types::{NodeId, Tick};

pub const DEFAULT_SUSPECT_TIMEOUT: Tick = 5;
pub const DEFAULT_REMOVE_TIMEOUT: Tick = 20;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub heartbeat: i64,
    /// Peers marked suspect during this sweep (already-suspected ones are not repeated).
    pub suspected: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureDetector {
    suspect_timeout: Tick,
    remove_timeout: Tick,
}

impl Default for FailureDetector {
    fn default() -> Self {
        Self {
            suspect_timeout: DEFAULT_SUSPECT_TIMEOUT,
            remove_timeout: DEFAULT_REMOVE_TIMEOUT,
        }
    }
}

impl FailureDetector {
    /// Callers validate `remove_timeout > suspect_timeout` through `Config`.
    pub fn new(suspect_timeout: Tick, remove_timeout: Tick) -> Self {
        Self {
            suspect_timeout,
            remove_timeout,
        }
    }

    pub fn suspect_timeout(&self) -> Tick {
        self.suspect_timeout
    }

    pub fn remove_timeout(&self) -> Tick {
        self.remove_timeout
    }

    /// Bumps the local heartbeat, then suspects and evicts silent peers.
    pub fn sweep(
        &self,
        table: &mut MembershipTable,
        now: Tick,
        log: &dyn MembershipLog,
    ) -> SweepReport {
        let mut report = SweepReport {
            heartbeat: table.beat(now),
            ..Default::default()
        };

        let mut expired = Vec::new();
        let mut silent = Vec::new();
        for entry in table.peers() {
            let elapsed = now.saturating_sub(entry.last_updated);
            if elapsed >= self.remove_timeout {
                expired.push(entry.id);
            } else if elapsed >= self.suspect_timeout {
                silent.push(entry.id);
            }
        }

        for id in silent {
            if table.suspect(&id) {
                tracing::debug!("Node {} suspected at tick {}", id, now);
                report.suspected.push(id);
            }
        }

        for id in expired {
            if table.remove(&id).is_some() {
                log.record_leave(table.local_id(), id);
                report.removed.push(id);
            }
        }

        report
    }
}
