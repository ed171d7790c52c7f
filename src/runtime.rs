//! Node Runtime
//!
//! Drives a single `MembershipNode` on a fixed tick period. The node itself
//! never awaits; this loop only decides when the next tick happens and
//! publishes a `MembershipView` after each one for readers such as the HTTP API.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::membership::node::{MembershipNode, MembershipView};
use crate::membership::types::Tick;

/// How often (in ticks) the runner logs a cluster summary.
const STATS_EVERY: Tick = 10;

pub struct NodeRunner {
    node: MembershipNode,
    period: Duration,
    views: watch::Sender<MembershipView>,
}

impl NodeRunner {
    pub fn new(node: MembershipNode, period: Duration) -> (Self, watch::Receiver<MembershipView>) {
        let (views, rx) = watch::channel(node.view());
        (
            Self {
                node,
                period,
                views,
            },
            rx,
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<MembershipView> {
        self.views.subscribe()
    }

    /// Starts the node and ticks it until `shutdown` resolves.
    ///
    /// Returns the node so callers can inspect its final state.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> MembershipNode {
        tokio::pin!(shutdown);

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut now: Tick = 0;
        self.node.start(now);
        self.publish();

        tracing::info!(
            "Membership node {} running (introducer {}, tick {:?})",
            self.node.id(),
            self.node.introducer(),
            self.period
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Membership node {} shutting down", self.node.id());
                    break;
                }
                _ = interval.tick() => {
                    now += 1;
                    let report = self.node.tick(now);

                    for id in &report.suspected {
                        tracing::warn!("Node {} suspected (no heartbeat progress)", id);
                    }
                    if report.malformed > 0 {
                        tracing::debug!("Dropped {} malformed messages", report.malformed);
                    }
                    if now % STATS_EVERY == 0 {
                        self.log_stats();
                    }

                    self.publish();
                }
            }
        }

        self.node
    }

    fn publish(&self) {
        // No subscribers is fine; the view is only informational.
        let _ = self.views.send(self.node.view());
    }

    fn log_stats(&self) {
        let alive = self.node.alive_members();
        tracing::info!(
            "Cluster stats: {} alive nodes, {} suspected (state={}, heartbeat={})",
            alive.len(),
            self.node.suspected_members().len(),
            self.node.join_state(),
            self.node.heartbeat()
        );
        for entry in alive {
            tracing::debug!("  - {} heartbeat={}", entry.id, entry.heartbeat);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::membership::log::RecordingLog;
    use crate::membership::types::{JoinState, NodeId};
    use crate::transport::MemoryNetwork;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    fn node(network: &Arc<MemoryNetwork>, port: u16) -> MembershipNode {
        let id = NodeId::localhost(port);
        let config = Config::with_introducer(NodeId::localhost(7000));
        MembershipNode::new(
            id,
            &config,
            Arc::new(network.register(id)),
            Arc::new(RecordingLog::new()),
        )
        .unwrap()
        .with_seed(port as u64)
    }

    #[tokio::test]
    async fn test_runner_ticks_until_shutdown() {
        let network = MemoryNetwork::new();
        let (runner, _views) = NodeRunner::new(node(&network, 7000), Duration::from_millis(5));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(runner.run(async move {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(()).unwrap();
        let node = handle.await.unwrap();

        assert_eq!(node.join_state(), JoinState::Member);
        assert!(node.heartbeat() > 0);
        assert_eq!(node.heartbeat() as u64, node.stats().ticks);
    }

    #[tokio::test]
    async fn test_two_runners_join_and_publish_views() {
        let network = MemoryNetwork::new();
        let (introducer, _) = NodeRunner::new(node(&network, 7000), Duration::from_millis(5));
        let (joiner, mut views) = NodeRunner::new(node(&network, 7001), Duration::from_millis(5));
        let (stop_tx, _) = tokio::sync::broadcast::channel::<()>(1);

        let mut stop_a = stop_tx.subscribe();
        let mut stop_b = stop_tx.subscribe();
        let a = tokio::spawn(introducer.run(async move {
            let _ = stop_a.recv().await;
        }));
        let b = tokio::spawn(joiner.run(async move {
            let _ = stop_b.recv().await;
        }));

        let joined = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                views.changed().await.unwrap();
                let view = views.borrow_and_update().clone();
                if view.state == JoinState::Member && view.alive_count() == 2 {
                    return view;
                }
            }
        })
        .await
        .expect("joiner never saw the introducer");

        stop_tx.send(()).unwrap();
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(joined.node, NodeId::localhost(7001));
        assert!(joined.members.iter().any(|e| e.id == NodeId::localhost(7000)));
    }
}
