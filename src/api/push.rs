//! Push notifications coming from the SCM server

use axum::{Json, extract::State as AxumState, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::SharedState;
use crate::config::WebhookConfig;
use crate::dispatcher::DispatchReport;
use crate::error::HookExecutionError;
use crate::payload::Dialect;
use crate::repository::PushEvent;

#[derive(Debug, Serialize)]
pub struct DeliverySummary {
    pub branch: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

/// What happened for one configured webhook
#[derive(Debug, Serialize)]
pub struct DispatchSummary {
    pub url: String,
    pub dialect: Dialect,
    pub id: Option<Uuid>,
    pub dispatched_at: Option<String>,
    pub deliveries: Vec<DeliverySummary>,
    pub error: Option<String>,
}

impl DispatchSummary {
    fn from_report(webhook: &WebhookConfig, report: &DispatchReport) -> Self {
        let deliveries = report
            .deliveries
            .iter()
            .map(|d| DeliverySummary {
                branch: d.branch.clone(),
                status: d.outcome.as_ref().ok().copied(),
                error: d.outcome.as_ref().err().map(ToString::to_string),
            })
            .collect();

        Self {
            url: webhook.url.clone(),
            dialect: webhook.dialect,
            id: Some(report.id),
            dispatched_at: Some(report.dispatched_at.to_rfc3339()),
            deliveries,
            error: None,
        }
    }

    fn failed(webhook: &WebhookConfig, err: &HookExecutionError) -> Self {
        Self {
            url: webhook.url.clone(),
            dialect: webhook.dialect,
            id: None,
            dispatched_at: None,
            deliveries: Vec::new(),
            error: Some(err.to_string()),
        }
    }
}

/// POST /push - Notify every webhook configured for the pushed repository.
///
/// Webhooks are dispatched one after another. Responds 502 if any dispatch
/// or delivery failed, 200 otherwise.
pub async fn handle_push(
    AxumState(state): AxumState<SharedState>,
    Json(event): Json<PushEvent>,
) -> impl IntoResponse {
    // Clone the repository config to avoid holding the lock across deliveries
    let repository = {
        let config = state.config.read().await;
        config.find_repository(&event.repository).cloned()
    };

    let Some(repository) = repository else {
        warn!("No configured repository '{}', skipping.", event.repository);
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Unknown repository '{}'", event.repository) })),
        )
            .into_response();
    };

    if !repository.supports_webhooks() {
        info!(
            "Repository '{}' has type '{}', webhooks are only sent for git repositories",
            event.repository, repository.repository_type
        );
        return StatusCode::NO_CONTENT.into_response();
    }

    info!(
        "Push to '{}': {} changed branch(es), {} webhook(s)",
        event.repository,
        event.changes.len(),
        repository.webhooks.len()
    );

    let service = state.repository_services.create(&repository);
    let mut failed = false;
    let mut dispatches = Vec::with_capacity(repository.webhooks.len());

    for webhook in &repository.webhooks {
        match state
            .dispatcher
            .dispatch(webhook, service.as_ref(), &event)
            .await
        {
            Ok(report) => {
                failed |= !report.is_success();
                dispatches.push(DispatchSummary::from_report(webhook, &report));
            }
            Err(e) => {
                error!("{}", e);
                failed = true;
                dispatches.push(DispatchSummary::failed(webhook, &e));
            }
        }
    }

    let status = if failed {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(json!({
            "repository": event.repository,
            "dispatches": dispatches,
        })),
    )
        .into_response()
}
