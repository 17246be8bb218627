//! On-disk layout under the configured base directory.
//!
//! ```text
//! <base>/
//! ├── remote/<provider>/<user>/<repository>/   local mirror
//! ├── snapshot/<YYYY>/<MM>/<DD>/<ts>.json     one file per capture
//! ├── posts/                                  writer output
//! └── images/                                 reserved
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{DoctrailError, Result};
use crate::types::Remote;

/// Resolves every path the engine and its collaborators touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLayout {
    base_dir: PathBuf,
    provider: String,
}

impl EngineLayout {
    pub fn new(base_dir: impl Into<PathBuf>, provider: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            provider: provider.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// `<base>/remote/<provider>`
    pub fn remote_root(&self) -> PathBuf {
        self.base_dir.join("remote").join(&self.provider)
    }

    /// `<base>/remote/<provider>/<user>/<repository>`
    pub fn mirror_dir(&self, remote: &Remote) -> PathBuf {
        self.remote_root()
            .join(&remote.user)
            .join(&remote.repository)
    }

    /// `<base>/snapshot`
    pub fn snapshot_root(&self) -> PathBuf {
        self.base_dir.join("snapshot")
    }

    /// `<base>/posts`
    pub fn posts_dir(&self) -> PathBuf {
        self.base_dir.join("posts")
    }

    /// `<base>/images`
    pub fn images_dir(&self) -> PathBuf {
        self.base_dir.join("images")
    }

    /// Create every top-level directory. Safe to call repeatedly.
    pub fn bootstrap(&self) -> Result<()> {
        let dirs = [
            self.remote_root(),
            self.snapshot_root(),
            self.posts_dir(),
            self.images_dir(),
        ];

        for dir in &dirs {
            std::fs::create_dir_all(dir).map_err(|e| DoctrailError::io(dir, e))?;
        }

        debug!(base = %self.base_dir.display(), "layout bootstrapped");
        Ok(())
    }
}

/// `<root>/<YYYY>/<MM>/<DD>/<captured_at>.json`, partitioned by the UTC date
/// of the capture timestamp (milliseconds since the Unix epoch).
pub fn snapshot_file(root: &Path, captured_at: i64) -> Result<PathBuf> {
    let at: DateTime<Utc> = DateTime::from_timestamp_millis(captured_at).ok_or_else(|| {
        DoctrailError::validation(format!("capture timestamp {captured_at} is out of range"))
    })?;

    Ok(root
        .join(at.format("%Y").to_string())
        .join(at.format("%m").to_string())
        .join(at.format("%d").to_string())
        .join(format!("{captured_at}.json")))
}
