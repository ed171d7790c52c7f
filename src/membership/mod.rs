//! Membership & Failure Detection Module
//!
//! Implements a heartbeat gossip membership protocol. Every node keeps its own
//! table of peers, spreads it to random peers every tick, and evicts peers whose
//! heartbeat stopped advancing.
//!
//! ## Core Mechanisms
//! - **Join**: a new node introduces itself to a well-known introducer, which answers with its table.
//! - **Gossip**: members periodically send their whole live table to `fanout` random peers.
//! - **Merge**: higher heartbeats win; entries are stamped with the receiver's own clock.
//! - **Failure Detection**: a two-stage "suspect" -> "removed" model driven by local timeouts.
//!   Suspected entries are never gossiped onward and never revived by a merge.

pub mod codec;
pub mod detector;
pub mod gossip;
pub mod join;
pub mod log;
pub mod node;
pub mod table;
pub mod types;
