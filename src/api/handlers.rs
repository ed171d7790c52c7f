use axum::{Json, extract::Extension, http::StatusCode};
use serde::Serialize;
use tokio::sync::watch;

use crate::membership::node::MembershipView;
use crate::membership::types::JoinState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub node: String,
    pub state: JoinState,
    pub heartbeat: i64,
    pub alive: usize,
    pub suspected: usize,
}

pub async fn handle_members(
    Extension(views): Extension<watch::Receiver<MembershipView>>,
) -> Json<MembershipView> {
    Json(views.borrow().clone())
}

pub async fn handle_health(
    Extension(views): Extension<watch::Receiver<MembershipView>>,
) -> (StatusCode, Json<HealthResponse>) {
    let view = views.borrow().clone();
    let alive = view.alive_count();

    let status = if view.state == JoinState::Member {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            node: view.node.to_string(),
            state: view.state,
            heartbeat: view.heartbeat,
            alive,
            suspected: view.members.len() - alive,
        }),
    )
}
