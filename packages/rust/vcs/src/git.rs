//! `git` subprocess transport.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use url::Url;

use doctrail_shared::{DoctrailError, GitConfig, Remote, Result, fsutil};

use crate::{CloneRequest, CloneResult, PullRequest, PullResult, VersionControl};

/// Runs the configured `git` binary for clone and pull.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: String,
    provider_url: Url,
    clone_depth: Option<u32>,
}

impl GitCli {
    pub fn new(binary: impl Into<String>, provider_url: &str) -> Result<Self> {
        let mut provider_url = Url::parse(provider_url).map_err(|e| {
            DoctrailError::config(format!("invalid provider URL '{provider_url}': {e}"))
        })?;
        // Url::join replaces the last segment unless the base ends with '/'.
        if !provider_url.path().ends_with('/') {
            let path = format!("{}/", provider_url.path());
            provider_url.set_path(&path);
        }

        Ok(Self {
            binary: binary.into(),
            provider_url,
            clone_depth: None,
        })
    }

    pub fn from_config(config: &GitConfig) -> Result<Self> {
        Ok(Self::new(&config.binary, &config.provider_url)?.with_clone_depth(config.clone_depth))
    }

    pub fn with_clone_depth(mut self, depth: Option<u32>) -> Self {
        self.clone_depth = depth;
        self
    }

    /// `<provider_url>/<user>/<repository>.git`
    pub fn clone_url(&self, remote: &Remote) -> Result<Url> {
        self.provider_url
            .join(&format!("{}/{}.git", remote.user, remote.repository))
            .map_err(|e| DoctrailError::transport(format!("cannot build clone URL for {remote}: {e}")))
    }

    /// Run git with `args`, returning trimmed stdout.
    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(binary = %self.binary, ?args, "running git");

        let output = Command::new(&self.binary)
            .args(args)
            // Fail instead of blocking on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DoctrailError::transport(format!("failed to spawn {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DoctrailError::transport(format!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Current `HEAD` commit, or `None` when it cannot be resolved (empty repo).
    async fn head(&self, local_path: &Path) -> Option<String> {
        let path = local_path.to_string_lossy().into_owned();
        match self.run(&["-C", path.as_str(), "rev-parse", "HEAD"]).await {
            Ok(sha) if !sha.is_empty() => Some(sha),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %local_path.display(), error = %e, "could not resolve HEAD");
                None
            }
        }
    }
}

#[async_trait]
impl VersionControl for GitCli {
    #[instrument(skip_all, fields(remote = %request.remote, path = %request.local_path.display()))]
    async fn clone_repo(&self, request: &CloneRequest) -> Result<CloneResult> {
        let url = self.clone_url(&request.remote)?;
        if let Some(parent) = request.local_path.parent() {
            fsutil::ensure_dir(parent)?;
        }

        let depth = self.clone_depth.map(|d| d.to_string());
        let local_path = request.local_path.to_string_lossy().into_owned();
        let mut args = vec!["clone", "--quiet"];
        if let Some(depth) = depth.as_deref() {
            args.extend(["--depth", depth]);
        }
        args.extend([url.as_str(), local_path.as_str()]);

        self.run(&args).await?;
        let head = self.head(&request.local_path).await;

        info!(%url, head = head.as_deref().unwrap_or("-"), "remote cloned");

        Ok(CloneResult {
            url: url.to_string(),
            local_path: request.local_path.clone(),
            head,
        })
    }

    #[instrument(skip_all, fields(path = %request.local_path.display()))]
    async fn pull_repo(&self, request: &PullRequest) -> Result<PullResult> {
        let head_before = self.head(&request.local_path).await;

        let local_path = request.local_path.to_string_lossy().into_owned();
        self.run(&["-C", local_path.as_str(), "pull", "--ff-only", "--quiet"])
            .await?;

        let head_after = self.head(&request.local_path).await;
        let updated = head_before != head_after;

        info!(updated, head = head_after.as_deref().unwrap_or("-"), "mirror pulled");

        Ok(PullResult {
            local_path: request.local_path.clone(),
            head_before,
            head_after,
            updated,
        })
    }
}
