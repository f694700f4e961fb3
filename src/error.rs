use std::io;

/// Failures raised while building or delivering a webhook notification
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Http protocol not found for repository")]
    MissingHttpProtocol,

    #[error("Could not find default branch")]
    MissingDefaultBranch,

    #[error("Failed to read repository metadata: {0}")]
    Metadata(#[from] io::Error),

    #[error("Failed to serialize webhook payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Webhook delivery for branch '{branch}' failed: {message}")]
    DeliveryTransport { branch: String, message: String },
}

/// The single failure type handed back to the hook host.
///
/// Every [`WebhookError`] is wrapped together with the repository it
/// happened for, so callers can log and report consistently.
#[derive(Debug, thiserror::Error)]
#[error("Could not execute webhook for repository {repository}: {source}")]
pub struct HookExecutionError {
    pub repository: String,
    #[source]
    pub source: WebhookError,
}

impl HookExecutionError {
    pub fn new(repository: impl Into<String>, source: WebhookError) -> Self {
        Self {
            repository: repository.into(),
            source,
        }
    }
}

/// Errors raised by the host service while loading or changing configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

/// Helper type for Results that use WebhookError
pub type Result<T> = std::result::Result<T, WebhookError>;
