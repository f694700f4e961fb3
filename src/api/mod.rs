//! API module for all HTTP handlers

pub mod config;
pub mod push;
pub mod stats;

use axum::{Router, routing};

use crate::SharedState;

// Re-export handlers
pub use config::{get_config, reload_config_endpoint, update_webhooks};
pub use push::handle_push;
pub use stats::{root, status};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::get(root))
        .route("/status", routing::get(status))
        .route("/push", routing::post(handle_push))
        .route("/api/config", routing::get(get_config))
        .route("/api/reload", routing::post(reload_config_endpoint))
        .route(
            "/api/repositories/{namespace}/{name}/webhooks",
            routing::put(update_webhooks),
        )
        .with_state(state)
}
