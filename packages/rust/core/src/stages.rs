//! The six pipeline stages and their registry.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use doctrail_posts::{PostTargets, PostWriter};
use doctrail_shared::{DoctrailError, ProcessParams, Result};
use doctrail_snapshot::{SnapshotOptions, SnapshotReader};
use doctrail_vcs::{CloneRequest, PullRequest, VersionControl};

use crate::context::{ResultContext, StageId, StepPayload};

/// Everything a stage may touch during one run.
pub struct RunEnv {
    pub params: ProcessParams,
    /// Local mirror of the remote.
    pub mirror_dir: PathBuf,
    pub snapshot_root: PathBuf,
    pub posts_dir: PathBuf,
    pub vcs: Arc<dyn VersionControl>,
    pub snapshots: Arc<dyn SnapshotReader>,
    pub posts: Arc<dyn PostWriter>,
}

impl RunEnv {
    fn snapshot_name(&self) -> String {
        self.params.remote.to_string()
    }
}

/// One unit of pipeline work.
///
/// A stage consumes the context and returns it with exactly one new ledger
/// entry, or fails and ends the run.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    async fn run(&self, ctx: ResultContext, env: &RunEnv) -> Result<ResultContext>;
}

/// Build the ordered stage list for one run.
///
/// `mirror_exists` is observed once, before any stage runs; the load and pull
/// stages both branch on it, so exactly one of them does transport work.
pub fn register_stages(mirror_exists: bool) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(LoadRemote { mirror_exists }),
        Box::new(PullRemote { mirror_exists }),
        Box::new(ReadLastSnapshot),
        Box::new(CreateSnapshot),
        Box::new(DiffSnapshots),
        Box::new(RefreshOutput),
    ]
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Clones the remote when no mirror exists yet.
pub struct LoadRemote {
    mirror_exists: bool,
}

#[async_trait]
impl Stage for LoadRemote {
    fn id(&self) -> StageId {
        StageId::LoadRemote
    }

    #[instrument(skip_all, fields(remote = %env.params.remote))]
    async fn run(&self, ctx: ResultContext, env: &RunEnv) -> Result<ResultContext> {
        let result = if self.mirror_exists {
            debug!("mirror present, skipping clone");
            None
        } else {
            let request = CloneRequest {
                remote: env.params.remote.clone(),
                local_path: env.mirror_dir.clone(),
            };
            Some(env.vcs.clone_repo(&request).await?)
        };
        Ok(ctx.record(self.id(), true, StepPayload::Clone(result)))
    }
}

/// Pulls an existing mirror.
pub struct PullRemote {
    mirror_exists: bool,
}

#[async_trait]
impl Stage for PullRemote {
    fn id(&self) -> StageId {
        StageId::PullRemote
    }

    #[instrument(skip_all, fields(remote = %env.params.remote))]
    async fn run(&self, ctx: ResultContext, env: &RunEnv) -> Result<ResultContext> {
        let result = if self.mirror_exists {
            let request = PullRequest {
                local_path: env.mirror_dir.clone(),
            };
            Some(env.vcs.pull_repo(&request).await?)
        } else {
            debug!("mirror was just cloned, skipping pull");
            None
        };
        Ok(ctx.record(self.id(), true, StepPayload::Pull(result)))
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

pub struct ReadLastSnapshot;

#[async_trait]
impl Stage for ReadLastSnapshot {
    fn id(&self) -> StageId {
        StageId::ReadLastSnapshot
    }

    async fn run(&self, ctx: ResultContext, env: &RunEnv) -> Result<ResultContext> {
        let name = env.snapshot_name();
        let last = env
            .snapshots
            .read_last_snapshot(&env.snapshot_root, Some(&name))
            .await?;
        Ok(ctx.record(self.id(), true, StepPayload::LastSnapshot(last)))
    }
}

/// Captures the mirror and persists the snapshot.
pub struct CreateSnapshot;

#[async_trait]
impl Stage for CreateSnapshot {
    fn id(&self) -> StageId {
        StageId::CreateSnapshot
    }

    async fn run(&self, ctx: ResultContext, env: &RunEnv) -> Result<ResultContext> {
        let options = SnapshotOptions {
            doc_type: env.params.doc_type.clone(),
            name: env.snapshot_name(),
        };
        let snapshot = env.snapshots.create_snapshot(&env.mirror_dir, &options).await?;
        let persisted = env
            .snapshots
            .persist_snapshot(&env.snapshot_root, snapshot)
            .await?;

        info!(
            path = %persisted.path.display(),
            documents = persisted.snapshot.documents.len(),
            "snapshot created"
        );

        Ok(ctx.record(self.id(), true, StepPayload::Snapshot(persisted.snapshot)))
    }
}

pub struct DiffSnapshots;

#[async_trait]
impl Stage for DiffSnapshots {
    fn id(&self) -> StageId {
        StageId::DiffSnapshots
    }

    async fn run(&self, ctx: ResultContext, env: &RunEnv) -> Result<ResultContext> {
        let after = ctx.created_snapshot().ok_or_else(|| {
            DoctrailError::validation("no snapshot was created before the diff stage")
        })?;
        let diff = env.snapshots.diff_snapshot(ctx.last_snapshot(), after)?;

        info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            modified = diff.modified.len(),
            unchanged = diff.unchanged.len(),
            "snapshots diffed"
        );

        Ok(ctx.record(self.id(), true, StepPayload::Diff(diff)))
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Hands the created snapshot to the post writer. Records into the
/// create-snapshot slot, see [`StageId::ledger_key`].
pub struct RefreshOutput;

#[async_trait]
impl Stage for RefreshOutput {
    fn id(&self) -> StageId {
        StageId::RefreshOutput
    }

    async fn run(&self, ctx: ResultContext, env: &RunEnv) -> Result<ResultContext> {
        let snapshot = ctx.created_snapshot().ok_or_else(|| {
            DoctrailError::validation("no snapshot was created before the refresh stage")
        })?;
        let targets = PostTargets {
            posts_dir: env.posts_dir.clone(),
            remote_dir: env.mirror_dir.clone(),
        };
        let written = env.posts.write_posts(snapshot, &targets).await?;

        Ok(ctx.record(self.id(), true, StepPayload::Posts(written)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_order_matches_stage_ids() {
        for mirror_exists in [false, true] {
            let ids: Vec<StageId> = register_stages(mirror_exists).iter().map(|s| s.id()).collect();
            assert_eq!(ids, StageId::ALL.to_vec());
        }
    }
}
