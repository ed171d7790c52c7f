//! Transport Layer
//!
//! The membership protocol only needs best-effort datagrams: `send` is
//! fire-and-forget and `drain_inbound` returns whatever has already arrived
//! without waiting.
//!
//! - **`memory`**: in-process network with per-node queues, optional message
//!   loss and crash injection. Used by the simulator and the scenario tests.
//! - **`udp`**: real-wire transport over a UDP socket.

use bytes::Bytes;

use crate::error::TransportError;
use crate::membership::types::NodeId;

pub mod memory;
pub mod udp;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use udp::UdpTransport;

/// A node's handle on the network.
pub trait Transport: Send + Sync {
    /// Hands `payload` to the network for delivery to `dst`.
    ///
    /// `Ok` does not mean the datagram arrived.
    fn send(&self, dst: NodeId, payload: Bytes) -> Result<(), TransportError>;

    /// Takes every payload queued for this node. Never blocks.
    fn drain_inbound(&self) -> Vec<Bytes>;
}
