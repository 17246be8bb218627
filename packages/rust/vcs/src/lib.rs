//! Version-control transport for mirroring remote documentation sources.
//!
//! The pipeline only talks to the [`VersionControl`] trait. [`GitCli`] is the
//! default implementation and shells out to the `git` executable.

mod git;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use doctrail_shared::{Remote, Result};

pub use git::GitCli;

/// Clone `remote` into `local_path`, which must not exist yet.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub remote: Remote,
    pub local_path: PathBuf,
}

/// Update an existing mirror in place.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub local_path: PathBuf,
}

/// Outcome of a clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneResult {
    /// URL the repository was cloned from.
    pub url: String,
    pub local_path: PathBuf,
    /// Commit checked out after the clone; `None` for an empty repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
}

/// Outcome of a pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResult {
    pub local_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_after: Option<String>,
    /// Whether the pull moved `HEAD`.
    pub updated: bool,
}

/// Clone/pull transport used by the load and pull stages.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Create a new local mirror.
    async fn clone_repo(&self, request: &CloneRequest) -> Result<CloneResult>;

    /// Bring an existing local mirror up to date.
    async fn pull_repo(&self, request: &PullRequest) -> Result<PullResult>;
}
