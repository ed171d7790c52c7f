use bytes::Bytes;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::Transport;
use crate::error::TransportError;
use crate::membership::types::NodeId;

#[derive(Debug, Default)]
struct Inbox {
    closed: bool,
    messages: VecDeque<Bytes>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub sent: u64,
    pub dropped: u64,
    pub delivered: u64,
}

/// Shared, in-process datagram network.
///
/// Each registered node owns one inbox. Any thread may push into any inbox;
/// only the owner drains its own. Messages can be lost at random
/// (`drop_rate`) and a node can be crashed with `close`.
pub struct MemoryNetwork {
    inboxes: DashMap<NodeId, Inbox>,
    drop_rate: f64,
    rng: Mutex<StdRng>,
    sent: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
}

impl MemoryNetwork {
    /// A lossless network.
    pub fn new() -> Arc<Self> {
        Self::lossy(0.0, 0)
    }

    /// A network that silently loses each message with probability `drop_rate`.
    pub fn lossy(drop_rate: f64, seed: u64) -> Arc<Self> {
        Arc::new(Self {
            inboxes: DashMap::new(),
            drop_rate: drop_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        })
    }

    /// Attaches a node and returns its transport handle.
    ///
    /// Registering an id again reopens its inbox and discards anything queued.
    pub fn register(self: &Arc<Self>, id: NodeId) -> MemoryTransport {
        self.inboxes.insert(id, Inbox::default());
        MemoryTransport {
            local: id,
            network: self.clone(),
        }
    }

    /// Crashes a node: queued messages are lost and later sends to or from it fail.
    pub fn close(&self, id: &NodeId) {
        if let Some(mut inbox) = self.inboxes.get_mut(id) {
            inbox.closed = true;
            inbox.messages.clear();
        }
    }

    pub fn is_closed(&self, id: &NodeId) -> bool {
        self.inboxes.get(id).map(|inbox| inbox.closed).unwrap_or(true)
    }

    pub fn pending(&self, id: &NodeId) -> usize {
        self.inboxes
            .get(id)
            .map(|inbox| inbox.messages.len())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }

    fn should_drop(&self) -> bool {
        if self.drop_rate <= 0.0 {
            return false;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        rng.gen_bool(self.drop_rate)
    }

    fn deliver(&self, src: NodeId, dst: NodeId, payload: Bytes) -> Result<(), TransportError> {
        if self.is_closed(&src) {
            return Err(TransportError::Closed);
        }

        let mut inbox = match self.inboxes.get_mut(&dst) {
            Some(inbox) if !inbox.closed => inbox,
            _ => return Err(TransportError::Unreachable(dst)),
        };

        self.sent.fetch_add(1, Ordering::Relaxed);
        if self.should_drop() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("Dropped message {} -> {}", src, dst);
            return Ok(());
        }

        inbox.messages.push_back(payload);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn take(&self, id: &NodeId) -> Vec<Bytes> {
        match self.inboxes.get_mut(id) {
            Some(mut inbox) if !inbox.closed => inbox.messages.drain(..).collect(),
            _ => Vec::new(),
        }
    }
}

/// One node's view of a `MemoryNetwork`.
#[derive(Clone)]
pub struct MemoryTransport {
    local: NodeId,
    network: Arc<MemoryNetwork>,
}

impl MemoryTransport {
    pub fn local_id(&self) -> NodeId {
        self.local
    }

    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }
}

impl Transport for MemoryTransport {
    fn send(&self, dst: NodeId, payload: Bytes) -> Result<(), TransportError> {
        self.network.deliver(self.local, dst, payload)
    }

    fn drain_inbound(&self) -> Vec<Bytes> {
        self.network.take(&self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_arrive_in_order_and_drain_empties_inbox() {
        let network = MemoryNetwork::new();
        let a = network.register(NodeId::localhost(7000));
        let b = network.register(NodeId::localhost(7001));

        a.send(b.local_id(), Bytes::from_static(b"one")).unwrap();
        a.send(b.local_id(), Bytes::from_static(b"two")).unwrap();

        assert_eq!(network.pending(&b.local_id()), 2);
        assert_eq!(
            b.drain_inbound(),
            vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]
        );
        assert!(b.drain_inbound().is_empty());
    }

    #[test]
    fn test_send_to_unknown_node_is_unreachable() {
        let network = MemoryNetwork::new();
        let a = network.register(NodeId::localhost(7000));

        let err = a
            .send(NodeId::localhost(7999), Bytes::from_static(b"x"))
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(id) if id == NodeId::localhost(7999)));
    }

    #[test]
    fn test_closed_node_neither_sends_nor_receives() {
        let network = MemoryNetwork::new();
        let a = network.register(NodeId::localhost(7000));
        let b = network.register(NodeId::localhost(7001));
        a.send(b.local_id(), Bytes::from_static(b"queued")).unwrap();

        network.close(&b.local_id());

        assert!(b.drain_inbound().is_empty());
        assert!(matches!(
            a.send(b.local_id(), Bytes::from_static(b"x")),
            Err(TransportError::Unreachable(_))
        ));
        assert!(matches!(
            b.send(a.local_id(), Bytes::from_static(b"x")),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_fully_lossy_network_drops_everything() {
        let network = MemoryNetwork::lossy(1.0, 42);
        let a = network.register(NodeId::localhost(7000));
        let b = network.register(NodeId::localhost(7001));

        for _ in 0..10 {
            a.send(b.local_id(), Bytes::from_static(b"lost")).unwrap();
        }

        assert!(b.drain_inbound().is_empty());
        assert_eq!(
            network.stats(),
            NetworkStats {
                sent: 10,
                dropped: 10,
                delivered: 0
            }
        );
    }

    #[test]
    fn test_concurrent_senders_share_one_inbox() {
        let network = MemoryNetwork::new();
        let sink = network.register(NodeId::localhost(7000));

        let handles: Vec<_> = (1..=4u16)
            .map(|i| {
                let transport = network.register(NodeId::localhost(7000 + i));
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        transport
                            .send(NodeId::localhost(7000), Bytes::from_static(b"hb"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sink.drain_inbound().len(), 100);
    }
}
