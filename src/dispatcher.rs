//! Turns a push into webhook deliveries.
//!
//! Repository metadata is resolved once per push. After that every changed
//! branch (or, in aggregate mode, the push as a whole) gets its own payload,
//! signature and POST. Deliveries run one after another in the order the
//! branches were reported; a failed delivery does not stop the rest.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{DeliveryMode, WebhookConfig};
use crate::error::{HookExecutionError, WebhookError};
use crate::payload::{NotificationPayload, RepositoryInfo};
use crate::repository::{PushEvent, RepositoryService};
use crate::signature::signature_header_value;
use crate::transport::{APPLICATION_JSON, HttpTransport, OutboundRequest, SPAN_KIND};

/// Outcome of one POST: the receiver's status code or the failure
#[derive(Debug)]
pub struct Delivery {
    pub branch: String,
    pub outcome: Result<u16, WebhookError>,
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Everything that happened while dispatching one push to one webhook
#[derive(Debug)]
pub struct DispatchReport {
    pub id: Uuid,
    pub repository: String,
    pub dispatched_at: DateTime<Utc>,
    pub deliveries: Vec<Delivery>,
}

impl DispatchReport {
    pub fn sent_count(&self) -> usize {
        self.deliveries.iter().filter(|d| d.is_sent()).count()
    }

    pub fn is_success(&self) -> bool {
        self.deliveries.iter().all(Delivery::is_sent)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Delivery> {
        self.deliveries.iter().filter(|d| !d.is_sent())
    }

    /// Status codes of all deliveries, or the first failure wrapped with the repository.
    pub fn into_result(self) -> Result<Vec<u16>, HookExecutionError> {
        let repository = self.repository;
        self.deliveries
            .into_iter()
            .map(|d| d.outcome)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| HookExecutionError::new(repository, source))
    }
}

pub struct WebhookDispatcher {
    transport: Arc<dyn HttpTransport>,
}

impl WebhookDispatcher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Dispatches `event` to the webhook described by `config`.
    ///
    /// Fails without sending anything when the repository metadata cannot be
    /// resolved. Delivery failures are recorded in the report instead.
    pub async fn dispatch(
        &self,
        config: &WebhookConfig,
        service: &dyn RepositoryService,
        event: &PushEvent,
    ) -> Result<DispatchReport, HookExecutionError> {
        let info = RepositoryInfo::fetch(service)
            .await
            .map_err(|e| HookExecutionError::new(event.repository.as_str(), e))?;

        let branches: Vec<&str> = match config.mode {
            DeliveryMode::PerBranch => event.changes.traversal().collect(),
            DeliveryMode::Aggregate => vec![info.default_branch.as_str()],
        };

        let id = Uuid::now_v7();
        info!(
            "Dispatch {} - {} {} webhook(s) for repository '{}' to {}",
            id,
            branches.len(),
            config.dialect,
            event.repository,
            config.url
        );

        let mut deliveries = Vec::with_capacity(branches.len());
        for branch in branches {
            let span = info_span!(
                "Webhook",
                dispatch = %id,
                repository = %event.repository,
                branch = %branch
            );
            let outcome = self.deliver(config, &info, branch).instrument(span).await;
            deliveries.push(Delivery {
                branch: branch.to_string(),
                outcome,
            });
        }

        Ok(DispatchReport {
            id,
            repository: event.repository.clone(),
            dispatched_at: Utc::now(),
            deliveries,
        })
    }

    /// Dispatches and turns any failed delivery into an error.
    pub async fn run(
        &self,
        config: &WebhookConfig,
        service: &dyn RepositoryService,
        event: &PushEvent,
    ) -> Result<Vec<u16>, HookExecutionError> {
        self.dispatch(config, service, event).await?.into_result()
    }

    async fn deliver(
        &self,
        config: &WebhookConfig,
        info: &RepositoryInfo,
        branch: &str,
    ) -> Result<u16, WebhookError> {
        let payload = config.dialect.build_payload(info, branch);
        let request = prepare_request(config, &payload)?;

        match self.transport.post(&request).await {
            Ok(status) => {
                if (200..300).contains(&status) {
                    info!("Webhook for branch '{}' sent, status {}", branch, status);
                } else {
                    warn!(
                        "Webhook for branch '{}' sent, receiver answered {}",
                        branch, status
                    );
                }
                Ok(status)
            }
            Err(e) => {
                error!("Webhook for branch '{}' failed: {}", branch, e);
                Err(WebhookError::DeliveryTransport {
                    branch: branch.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Serializes `payload` once and builds the POST around those bytes.
pub fn prepare_request(
    config: &WebhookConfig,
    payload: &NotificationPayload,
) -> Result<OutboundRequest, WebhookError> {
    let headers_for = config.dialect.headers();
    let body = payload.to_body()?;

    let mut headers = vec![(headers_for.event_header, headers_for.event_value.to_string())];
    if let Some(signature) = config
        .signing_secret()
        .and_then(|secret| signature_header_value(secret, &body))
    {
        headers.push((headers_for.signature_header, signature));
    }

    Ok(OutboundRequest {
        url: config.url.clone(),
        headers,
        content_type: APPLICATION_JSON,
        body,
        span_kind: SPAN_KIND,
        disable_certificate_validation: config.insecure,
        disable_hostname_validation: config.insecure,
    })
}
