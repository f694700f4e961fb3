//! Notification bodies sent to the GitOps controller.
//!
//! Two dialects are supported. The generic one describes a single branch and
//! whether it is the repository default. The GitHub-compatible one mimics a
//! GitHub push event: `commits` is always empty, which controllers such as
//! Argo CD read as "refresh everything that tracks this repository".

use serde::{Deserialize, Serialize};

use crate::error::{Result, WebhookError};
use crate::repository::{Branch, RepositoryService, ScmProtocol};

/// Prefix of the `ref` field in GitHub push events
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Payload and header convention used when talking to the controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    #[default]
    #[serde(rename = "generic", alias = "scmm")]
    Generic,
    #[serde(rename = "github", alias = "github_compatible")]
    GitHubCompatible,
}

/// Header names and values that differ between dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectHeaders {
    pub event_header: &'static str,
    pub event_value: &'static str,
    pub signature_header: &'static str,
}

const GENERIC_HEADERS: DialectHeaders = DialectHeaders {
    event_header: "X-SCM-PushEvent",
    event_value: "Push",
    signature_header: "X-SCM-Signature",
};

const GITHUB_HEADERS: DialectHeaders = DialectHeaders {
    event_header: "X-Github-Event",
    event_value: "push",
    signature_header: "X-Hub-Signature",
};

impl Dialect {
    pub fn headers(self) -> &'static DialectHeaders {
        match self {
            Dialect::Generic => &GENERIC_HEADERS,
            Dialect::GitHubCompatible => &GITHUB_HEADERS,
        }
    }

    /// Builds the body announcing a change of `branch`.
    pub fn build_payload(self, info: &RepositoryInfo, branch: &str) -> NotificationPayload {
        match self {
            Dialect::Generic => NotificationPayload::Scm(ScmPushEventPayload::new(
                &info.html_url,
                branch == info.default_branch,
                branch,
            )),
            Dialect::GitHubCompatible => NotificationPayload::GitHub(GitHubPushEventPayload::new(
                GitHubRepository {
                    html_url: info.html_url.clone(),
                    default_branch: info.default_branch.clone(),
                },
                branch,
            )),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Generic => write!(f, "generic"),
            Dialect::GitHubCompatible => write!(f, "github"),
        }
    }
}

/// Repository facts every payload is built from, resolved once per push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub html_url: String,
    pub default_branch: String,
}

impl RepositoryInfo {
    /// Picks the first `http` protocol URL and the branch flagged as default.
    pub fn resolve(protocols: &[ScmProtocol], branches: &[Branch]) -> Result<Self> {
        let html_url = protocols
            .iter()
            .find(|p| p.is_http())
            .map(|p| p.url.clone())
            .ok_or(WebhookError::MissingHttpProtocol)?;
        let default_branch = branches
            .iter()
            .find(|b| b.default_branch)
            .map(|b| b.name.clone())
            .ok_or(WebhookError::MissingDefaultBranch)?;

        Ok(Self {
            html_url,
            default_branch,
        })
    }

    /// Queries the repository backend and resolves the result.
    pub async fn fetch(service: &dyn RepositoryService) -> Result<Self> {
        let protocols = service.supported_protocols().await?;
        let branches = service.branches().await?;
        Self::resolve(&protocols, &branches)
    }
}

/// Body of the generic dialect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmPushEventPayload {
    pub html_url: String,
    pub branch: WebhookBranch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookBranch {
    pub default_branch: bool,
    pub name: String,
}

impl ScmPushEventPayload {
    pub fn new(html_url: &str, default_branch: bool, branch: &str) -> Self {
        Self {
            html_url: html_url.to_string(),
            branch: WebhookBranch {
                default_branch,
                name: branch.to_string(),
            },
        }
    }
}

/// Body of the GitHub-compatible dialect.
///
/// Changed files and revisions are deliberately left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubPushEventPayload {
    pub repository: GitHubRepository,
    pub commits: Vec<String>,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub html_url: String,
    pub default_branch: String,
}

impl GitHubPushEventPayload {
    pub fn new(repository: GitHubRepository, branch: &str) -> Self {
        Self {
            repository,
            commits: Vec::new(),
            git_ref: format!("{BRANCH_REF_PREFIX}{branch}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationPayload {
    Scm(ScmPushEventPayload),
    GitHub(GitHubPushEventPayload),
}

impl NotificationPayload {
    /// Serializes the payload. The returned bytes are both signed and sent.
    pub fn to_body(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
