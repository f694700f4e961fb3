//! Service status endpoints

use axum::{Json, extract::State as AxumState};
use serde::Serialize;

use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub started_at: String,
    pub total_repositories: usize,
    pub total_webhooks: usize,
}

pub async fn root() -> &'static str {
    "gitops_webhook"
}

/// GET /status - Service and configuration overview
pub async fn status(AxumState(state): AxumState<SharedState>) -> Json<ServerStatus> {
    let (total_repositories, total_webhooks) = {
        let config = state.config.read().await;
        (
            config.repository.len(),
            config.repository.iter().map(|r| r.webhooks.len()).sum::<usize>(),
        )
    };

    Json(ServerStatus {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        started_at: state.started_at.to_rfc3339(),
        total_repositories,
        total_webhooks,
    })
}
