//! Webhook configuration and the TOML file the host service reads it from

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::payload::Dialect;
use crate::repository::ScmProtocol;

/// Stands in for a stored secret whenever configuration leaves the service
pub const DUMMY_SECRET: &str = "__DUMMY__";

/// Only repositories of this type get webhooks dispatched
pub const SUPPORTED_REPOSITORY_TYPE: &str = "git";

/// Whether one notification goes out per changed branch or per push
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    PerBranch,
    /// One notification for the repository default branch
    Aggregate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default)]
    pub mode: DeliveryMode,
}

impl WebhookConfig {
    pub fn new(dialect: Dialect, url: impl Into<String>, secret: &str, insecure: bool) -> Self {
        Self {
            url: url.into(),
            secret: (!secret.is_empty()).then(|| secret.to_string()),
            insecure,
            dialect,
            mode: DeliveryMode::PerBranch,
        }
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    /// The secret used for signing, None when unset or empty
    pub fn signing_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Copy safe for display: a configured secret is replaced by [`DUMMY_SECRET`].
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        if masked.signing_secret().is_some() {
            masked.secret = Some(DUMMY_SECRET.to_string());
        }
        masked
    }

    pub fn has_masked_secret(&self) -> bool {
        self.secret.as_deref() == Some(DUMMY_SECRET)
    }

    /// Puts the stored secret back if this update still carries the placeholder.
    ///
    /// Without a stored webhook the placeholder stays, so [`validate`](Self::validate)
    /// refuses the update instead of silently dropping the secret.
    pub fn restore_masked_secret(&mut self, previous: Option<&WebhookConfig>) {
        if let Some(previous) = previous.filter(|_| self.has_masked_secret()) {
            self.secret = previous.secret.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("webhook url must not be empty".into()));
        }
        reqwest::Url::parse(&self.url).map_err(|e| {
            ConfigError::Invalid(format!("invalid webhook url '{}': {}", self.url, e))
        })?;
        if self.has_masked_secret() {
            return Err(ConfigError::Invalid(format!(
                "webhook '{}' carries the masked secret placeholder",
                self.url
            )));
        }
        Ok(())
    }
}

/// Restores masked secrets of `updated` from `previous`.
///
/// The stored webhook is the one with the same URL, falling back to the one at
/// the same position (an edited URL). Anything else keeps the placeholder.
pub fn restore_masked_secrets(previous: &[WebhookConfig], updated: &mut [WebhookConfig]) {
    for (index, webhook) in updated.iter_mut().enumerate() {
        let stored = previous
            .iter()
            .find(|p| p.url == webhook.url)
            .or_else(|| previous.get(index));
        webhook.restore_masked_secret(stored);
    }
}

fn default_repository_type() -> String {
    SUPPORTED_REPOSITORY_TYPE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub namespace: String,
    pub name: String,
    #[serde(rename = "type", default = "default_repository_type")]
    pub repository_type: String,
    pub path: PathBuf,
    #[serde(default)]
    pub protocols: Vec<ScmProtocol>,
    #[serde(default, rename = "webhook")]
    pub webhooks: Vec<WebhookConfig>,
}

impl RepositoryConfig {
    /// `namespace/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn supports_webhooks(&self) -> bool {
        self.repository_type == SUPPORTED_REPOSITORY_TYPE
    }

    pub fn masked(&self) -> Self {
        Self {
            webhooks: self.webhooks.iter().map(WebhookConfig::masked).collect(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub repository: Vec<RepositoryConfig>,
}

impl NotifierConfig {
    pub fn find_repository(&self, full_name: &str) -> Option<&RepositoryConfig> {
        self.repository.iter().find(|r| r.full_name() == full_name)
    }

    pub fn find_repository_mut(&mut self, full_name: &str) -> Option<&mut RepositoryConfig> {
        self.repository.iter_mut().find(|r| r.full_name() == full_name)
    }

    pub fn masked(&self) -> Self {
        Self {
            repository: self.repository.iter().map(RepositoryConfig::masked).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (idx, repository) in self.repository.iter().enumerate() {
            let full_name = repository.full_name();
            if self.repository[..idx].iter().any(|r| r.full_name() == full_name) {
                return Err(ConfigError::Invalid(format!(
                    "repository '{}' is configured twice",
                    full_name
                )));
            }
            for webhook in &repository.webhooks {
                webhook.validate()?;
            }
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<NotifierConfig, ConfigError> {
    let config: NotifierConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load and parse the configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<NotifierConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        ConfigError::Invalid(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;
    parse_config(&content)
}

/// Async variant of [`load_config`] for use inside request handlers
pub async fn reload_config(path: impl AsRef<Path>) -> Result<NotifierConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path.as_ref()).await?;
    parse_config(&content)
}
