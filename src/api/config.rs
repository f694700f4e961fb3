//! Config API endpoints. Secrets never leave the service unmasked.

use axum::{
    Json,
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::SharedState;
use crate::config::{WebhookConfig, reload_config, restore_masked_secrets};

/// GET /api/config - Current configuration with masked secrets
pub async fn get_config(AxumState(state): AxumState<SharedState>) -> impl IntoResponse {
    let config = state.config.read().await;
    Json(json!({
        "path": state.config_path.to_string_lossy(),
        "config": config.masked(),
    }))
}

/// PUT /api/repositories/{namespace}/{name}/webhooks - Replace a repository's webhooks
///
/// Webhooks still carrying the masked placeholder keep their stored secret.
pub async fn update_webhooks(
    AxumState(state): AxumState<SharedState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut webhooks): Json<Vec<WebhookConfig>>,
) -> impl IntoResponse {
    let full_name = format!("{}/{}", namespace, name);
    let mut config = state.config.write().await;

    let Some(repository) = config.find_repository_mut(&full_name) else {
        warn!("Webhook update for unknown repository '{}'", full_name);
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Unknown repository '{}'", full_name) })),
        )
            .into_response();
    };

    restore_masked_secrets(&repository.webhooks, &mut webhooks);
    if let Err(e) = webhooks.iter().try_for_each(WebhookConfig::validate) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response();
    }

    info!(
        "Replacing {} webhook(s) of repository '{}' with {}",
        repository.webhooks.len(),
        full_name,
        webhooks.len()
    );
    repository.webhooks = webhooks;

    let masked: Vec<WebhookConfig> = repository.webhooks.iter().map(WebhookConfig::masked).collect();
    Json(json!({
        "repository": full_name,
        "webhooks": masked,
    }))
    .into_response()
}

/// POST /api/reload - Reload configuration from disk
pub async fn reload_config_endpoint(AxumState(state): AxumState<SharedState>) -> impl IntoResponse {
    match reload_config(&state.config_path).await {
        Ok(new_config) => {
            let mut config = state.config.write().await;
            *config = new_config;
            info!(
                "Configuration reloaded successfully from {:?}",
                state.config_path
            );
            Json(json!({
                "status": "success",
                "message": "Configuration reloaded successfully"
            }))
            .into_response()
        }
        Err(e) => {
            error!("Failed to reload config: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": e.to_string()
                })),
            )
                .into_response()
        }
    }
}
