//! Status API
//!
//! Read-only HTTP view of a node's membership table. Handlers read the latest
//! `MembershipView` published by the `NodeRunner`; they never touch the table.

use axum::{Router, extract::Extension, routing::get};
use tokio::sync::watch;

use crate::membership::node::MembershipView;

pub mod handlers;

/// Current membership view of this node.
pub const ENDPOINT_MEMBERS: &str = "/members";
/// Liveness/readiness: 200 once the node is a group member, 503 before.
pub const ENDPOINT_HEALTH: &str = "/health";

pub fn router(views: watch::Receiver<MembershipView>) -> Router {
    Router::new()
        .route(ENDPOINT_MEMBERS, get(handlers::handle_members))
        .route(ENDPOINT_HEALTH, get(handlers::handle_health))
        .layer(Extension(views))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::types::{JoinState, MembershipEntry, NodeId};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn view(state: JoinState) -> MembershipView {
        MembershipView {
            node: NodeId::localhost(7001),
            state,
            tick: 12,
            heartbeat: 11,
            members: vec![
                MembershipEntry::new(NodeId::localhost(7000), 40, 12),
                MembershipEntry::new(NodeId::localhost(7001), 11, 12),
                MembershipEntry::new(NodeId::localhost(7002), -1, 4),
            ],
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_members_endpoint_returns_view() {
        let (_tx, rx) = watch::channel(view(JoinState::Member));

        let (status, json) = get_json(router(rx), ENDPOINT_MEMBERS).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["node"], "127.0.0.1:7001");
        assert_eq!(json["state"], "Member");
        assert_eq!(json["members"].as_array().unwrap().len(), 3);
        assert_eq!(json["members"][2]["heartbeat"], -1);
    }

    #[tokio::test]
    async fn test_health_reflects_join_state() {
        let (tx, rx) = watch::channel(view(JoinState::Joining));
        let app = router(rx);

        let (status, json) = get_json(app.clone(), ENDPOINT_HEALTH).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["state"], "Joining");

        tx.send(view(JoinState::Member)).unwrap();

        let (status, json) = get_json(app, ENDPOINT_HEALTH).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["alive"], 2);
        assert_eq!(json["suspected"], 1);
    }
}
