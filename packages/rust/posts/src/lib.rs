//! Post rendering for captured snapshots.
//!
//! The pipeline hands the freshly created snapshot to a [`PostWriter`].
//! [`MarkdownPostWriter`] turns every document into a Markdown post with YAML
//! frontmatter under the posts directory.

mod render;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use doctrail_shared::{Result, Snapshot};

pub use render::{MarkdownPostWriter, assign_post_paths, post_path, title_from_path};

/// Where posts are written and where their sources are read from.
#[derive(Debug, Clone)]
pub struct PostTargets {
    pub posts_dir: PathBuf,
    /// Mirror root the snapshot was captured from.
    pub remote_dir: PathBuf,
}

/// Outcome of one `write_posts` call. Paths are relative to `posts_dir`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub posts_dir: PathBuf,
    /// Posts created or rewritten.
    pub written: Vec<String>,
    /// Posts whose recorded fingerprint already matched.
    pub unchanged: Vec<String>,
    /// Previously generated posts whose document left the snapshot.
    pub removed: Vec<String>,
}

/// Materializes output content from a snapshot.
#[async_trait]
pub trait PostWriter: Send + Sync {
    async fn write_posts(&self, snapshot: &Snapshot, targets: &PostTargets) -> Result<WriteResult>;
}
