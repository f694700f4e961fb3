//! Repository side of a push: the branch changes that triggered it and the
//! metadata queries the dispatcher needs to describe the repository.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::config::RepositoryConfig;

/// Protocol type whose URL is published as `html_url`
pub const HTTP_PROTOCOL: &str = "http";

/// An access protocol a repository is reachable by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmProtocol {
    #[serde(rename = "type")]
    pub protocol_type: String,
    pub url: String,
}

impl ScmProtocol {
    pub fn new(protocol_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            protocol_type: protocol_type.into(),
            url: url.into(),
        }
    }

    pub fn is_http(&self) -> bool {
        self.protocol_type == HTTP_PROTOCOL
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub default_branch: bool,
}

impl Branch {
    pub fn normal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_branch: false,
        }
    }

    pub fn default_branch(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_branch: true,
        }
    }
}

/// Branch names touched by a push, in the order the SCM reported them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchChanges {
    #[serde(default)]
    pub created_or_modified: Vec<String>,
    #[serde(default)]
    pub deleted_or_closed: Vec<String>,
}

impl BranchChanges {
    /// Created/modified branches first, then deleted/closed ones.
    ///
    /// A branch listed in both sets is yielded twice.
    pub fn traversal(&self) -> impl Iterator<Item = &str> {
        self.created_or_modified
            .iter()
            .chain(self.deleted_or_closed.iter())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.created_or_modified.len() + self.deleted_or_closed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A received push. `repository` is the `namespace/name` identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub repository: String,
    #[serde(flatten)]
    pub changes: BranchChanges,
}

impl PushEvent {
    pub fn new(repository: impl Into<String>, changes: BranchChanges) -> Self {
        Self {
            repository: repository.into(),
            changes,
        }
    }
}

/// Read-only metadata queries against the repository backend
#[async_trait]
pub trait RepositoryService: Send + Sync {
    async fn supported_protocols(&self) -> io::Result<Vec<ScmProtocol>>;

    async fn branches(&self) -> io::Result<Vec<Branch>>;
}

/// Creates a metadata service for a configured repository
pub trait RepositoryServiceFactory: Send + Sync {
    fn create(&self, repository: &RepositoryConfig) -> Box<dyn RepositoryService>;
}

/// Answers metadata queries from a git repository on disk.
///
/// Branches come from `refs/heads`, the default branch is whatever `HEAD`
/// points at. Protocols are not something git knows about, so they are
/// taken from configuration.
#[derive(Debug, Clone)]
pub struct GitRepositoryService {
    path: PathBuf,
    protocols: Vec<ScmProtocol>,
}

impl GitRepositoryService {
    pub fn new(path: impl Into<PathBuf>, protocols: Vec<ScmProtocol>) -> Self {
        Self {
            path: path.into(),
            protocols,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn git(&self, args: &[&str]) -> io::Result<std::process::Output> {
        debug!("Running (cwd = '{}'): git {}", self.path.display(), args.join(" "));
        let mut command = Command::new("git");
        command.current_dir(&self.path).args(args);
        // Stop git from discovering an enclosing repository above `path`
        let absolute = std::path::absolute(&self.path)?;
        if let Some(parent) = absolute.parent() {
            command.env("GIT_CEILING_DIRECTORIES", parent);
        }
        command.output().await
    }

    async fn head_branch(&self) -> io::Result<Option<String>> {
        let output = self.git(&["symbolic-ref", "--quiet", "HEAD"]).await?;
        if !output.status.success() {
            // detached HEAD
            return Ok(None);
        }
        let target = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(target
            .strip_prefix("refs/heads/")
            .filter(|name| !name.is_empty())
            .map(str::to_string))
    }
}

#[async_trait]
impl RepositoryService for GitRepositoryService {
    async fn supported_protocols(&self) -> io::Result<Vec<ScmProtocol>> {
        Ok(self.protocols.clone())
    }

    async fn branches(&self) -> io::Result<Vec<Branch>> {
        let output = self
            .git(&["for-each-ref", "--format=%(refname:lstrip=2)", "refs/heads"])
            .await?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "git for-each-ref failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let head = self.head_branch().await?;
        let branches = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|name| Branch {
                name: name.to_string(),
                default_branch: head.as_deref() == Some(name),
            })
            .collect();
        Ok(branches)
    }
}

/// Builds a [`GitRepositoryService`] from the repository's configured path
#[derive(Debug, Clone, Copy, Default)]
pub struct GitRepositoryServiceFactory;

impl RepositoryServiceFactory for GitRepositoryServiceFactory {
    fn create(&self, repository: &RepositoryConfig) -> Box<dyn RepositoryService> {
        Box::new(GitRepositoryService::new(
            repository.path.clone(),
            repository.protocols.clone(),
        ))
    }
}
