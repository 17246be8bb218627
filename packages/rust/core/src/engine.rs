//! Engine: layout bootstrap, stage registration, run lifecycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{info, instrument, warn};

use doctrail_posts::{MarkdownPostWriter, PostWriter};
use doctrail_shared::{AppConfig, EngineLayout, ProcessParams, Result, RunId};
use doctrail_snapshot::{FsSnapshotReader, SnapshotReader};
use doctrail_vcs::{GitCli, VersionControl};

use crate::context::{ResultContext, StageId};
use crate::runner;
use crate::stages::{self, RunEnv, Stage};

/// Coarse lifecycle of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineStatus {
    Idle,
    Running { run_id: RunId, stage: StageId },
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a stage runs. `index` is 1-based.
    fn stage_started(&self, stage: StageId, index: usize, total: usize);
    /// Called after a stage recorded its ledger entry.
    fn stage_finished(&self, stage: StageId, elapsed: Duration);
    /// Called when the run completes successfully.
    fn done(&self, ctx: &ResultContext);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _stage: StageId, _index: usize, _total: usize) {}
    fn stage_finished(&self, _stage: StageId, _elapsed: Duration) {}
    fn done(&self, _ctx: &ResultContext) {}
}

/// Buffered transitions per subscriber. One run publishes seven.
const TRANSITION_CAPACITY: usize = 64;

/// Runs the documentation pipeline against one base directory.
pub struct Engine {
    layout: EngineLayout,
    vcs: Arc<dyn VersionControl>,
    snapshots: Arc<dyn SnapshotReader>,
    posts: Arc<dyn PostWriter>,
    status: watch::Sender<EngineStatus>,
    transitions: broadcast::Sender<EngineStatus>,
    run_lock: Mutex<()>,
}

impl Engine {
    /// Create an engine and its directory layout.
    pub fn new(
        layout: EngineLayout,
        vcs: Arc<dyn VersionControl>,
        snapshots: Arc<dyn SnapshotReader>,
        posts: Arc<dyn PostWriter>,
    ) -> Result<Self> {
        layout.bootstrap()?;
        let (status, _) = watch::channel(EngineStatus::Idle);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);

        Ok(Self {
            layout,
            vcs,
            snapshots,
            posts,
            status,
            transitions,
            run_lock: Mutex::new(()),
        })
    }

    /// Engine with the git transport, filesystem snapshots, and Markdown posts.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let layout = EngineLayout::new(config.base_dir()?, config.git.provider.clone());
        Self::new(
            layout,
            Arc::new(GitCli::from_config(&config.git)?),
            Arc::new(FsSnapshotReader::new()),
            Arc::new(MarkdownPostWriter::new()),
        )
    }

    pub fn layout(&self) -> &EngineLayout {
        &self.layout
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.borrow()
    }

    /// Receive every status transition published after this call, in order.
    ///
    /// A receiver that falls more than a buffer behind gets
    /// `RecvError::Lagged` and resumes from the oldest retained transition.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineStatus> {
        self.transitions.subscribe()
    }

    /// Latest status only, for callers that poll.
    pub fn watch_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    fn publish(&self, status: EngineStatus) {
        self.status.send_replace(status);
        // No subscribers is fine.
        let _ = self.transitions.send(status);
    }

    /// Ordered stages and their environment for one run.
    pub fn register(&self, params: &ProcessParams) -> (Vec<Box<dyn Stage>>, RunEnv) {
        let mirror_dir = self.layout.mirror_dir(&params.remote);
        let stages = stages::register_stages(mirror_dir.exists());

        let env = RunEnv {
            params: params.clone(),
            mirror_dir,
            snapshot_root: self.layout.snapshot_root(),
            posts_dir: self.layout.posts_dir(),
            vcs: Arc::clone(&self.vcs),
            snapshots: Arc::clone(&self.snapshots),
            posts: Arc::clone(&self.posts),
        };
        (stages, env)
    }

    /// Run the pipeline once for `params`.
    ///
    /// Runs on one engine are serialized. On failure no context is returned
    /// and the first stage error is passed through unchanged.
    #[instrument(skip_all, fields(remote = %params.remote, doc_type = %params.doc_type))]
    pub async fn process(
        &self,
        params: &ProcessParams,
        progress: &dyn ProgressReporter,
    ) -> Result<ResultContext> {
        params.validate()?;

        let _run = self.run_lock.lock().await;
        let _idle = IdleOnDrop(self);

        let start = Instant::now();
        let run_id = RunId::new();
        info!(%run_id, "starting run");

        let (stages, env) = self.register(params);
        let ctx = ResultContext::new(run_id, params);

        let ctx = runner::run_stages(&stages, ctx, &env, progress, |stage| {
            self.publish(EngineStatus::Running { run_id, stage });
        })
        .await
        .inspect_err(|e| warn!(%run_id, error = %e, "run failed"))?;

        progress.done(&ctx);
        info!(
            %run_id,
            steps = ctx.steps.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "run complete"
        );

        Ok(ctx)
    }
}

/// Resets the status to idle when a run ends, including by cancellation.
struct IdleOnDrop<'a>(&'a Engine);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.publish(EngineStatus::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use doctrail_posts::{PostTargets, WriteResult};
    use doctrail_shared::{CURRENT_SCHEMA_VERSION, DoctrailError, Remote, Snapshot};
    use doctrail_snapshot::{PersistedSnapshot, SnapshotOptions};
    use doctrail_vcs::{CloneRequest, CloneResult, PullRequest, PullResult};

    use crate::context::StepKey;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("dt-engine-test-{}", uuid::Uuid::now_v7()))
    }

    fn params() -> ProcessParams {
        ProcessParams::new(Remote::new("acme", "docs").unwrap(), "md").unwrap()
    }

    /// Creates the mirror directory on clone; pull is a no-op.
    struct StubVcs {
        fail_clone: bool,
    }

    #[async_trait]
    impl VersionControl for StubVcs {
        async fn clone_repo(&self, request: &CloneRequest) -> Result<CloneResult> {
            if self.fail_clone {
                return Err(DoctrailError::transport("connection refused"));
            }
            std::fs::create_dir_all(&request.local_path).unwrap();
            Ok(CloneResult {
                url: format!("file:///{}", request.remote),
                local_path: request.local_path.clone(),
                head: None,
            })
        }

        async fn pull_repo(&self, request: &PullRequest) -> Result<PullResult> {
            Ok(PullResult {
                local_path: request.local_path.clone(),
                head_before: None,
                head_after: None,
                updated: false,
            })
        }
    }

    /// In-memory snapshots; counts persisted captures.
    #[derive(Default)]
    struct MemorySnapshots {
        stored: StdMutex<Vec<Snapshot>>,
    }

    #[async_trait]
    impl SnapshotReader for MemorySnapshots {
        async fn create_snapshot(&self, _source: &Path, options: &SnapshotOptions) -> Result<Snapshot> {
            Ok(Snapshot {
                schema_version: CURRENT_SCHEMA_VERSION,
                doc_type: options.doc_type.clone(),
                name: options.name.clone(),
                captured_at: 0,
                documents: vec![],
            })
        }

        async fn persist_snapshot(&self, root: &Path, mut snapshot: Snapshot) -> Result<PersistedSnapshot> {
            let mut stored = self.stored.lock().unwrap();
            snapshot.captured_at = stored.len() as i64 + 1;
            stored.push(snapshot.clone());
            Ok(PersistedSnapshot {
                path: root.join(format!("{}.json", snapshot.captured_at)),
                snapshot,
            })
        }

        async fn read_last_snapshot(&self, _root: &Path, name: Option<&str>) -> Result<Option<Snapshot>> {
            let stored = self.stored.lock().unwrap();
            Ok(stored
                .iter()
                .rev()
                .find(|s| name.is_none_or(|n| s.name == n))
                .cloned())
        }
    }

    struct StubPosts {
        fail: bool,
    }

    #[async_trait]
    impl PostWriter for StubPosts {
        async fn write_posts(&self, _snapshot: &Snapshot, targets: &PostTargets) -> Result<WriteResult> {
            if self.fail {
                return Err(DoctrailError::render("template exploded"));
            }
            Ok(WriteResult {
                posts_dir: targets.posts_dir.clone(),
                ..WriteResult::default()
            })
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        started: StdMutex<Vec<StageId>>,
        finished: StdMutex<usize>,
        done: StdMutex<bool>,
    }

    impl ProgressReporter for RecordingProgress {
        fn stage_started(&self, stage: StageId, index: usize, total: usize) {
            let mut started = self.started.lock().unwrap();
            started.push(stage);
            assert_eq!(started.len(), index);
            assert_eq!(total, 6);
        }

        fn stage_finished(&self, _stage: StageId, _elapsed: Duration) {
            *self.finished.lock().unwrap() += 1;
        }

        fn done(&self, _ctx: &ResultContext) {
            *self.done.lock().unwrap() = true;
        }
    }

    fn engine(base: &Path, fail_clone: bool, fail_posts: bool) -> (Engine, Arc<MemorySnapshots>) {
        let snapshots = Arc::new(MemorySnapshots::default());
        let engine = Engine::new(
            EngineLayout::new(base, "github.com"),
            Arc::new(StubVcs { fail_clone }),
            snapshots.clone(),
            Arc::new(StubPosts { fail: fail_posts }),
        )
        .unwrap();
        (engine, snapshots)
    }

    #[test]
    fn new_bootstraps_layout() {
        let base = temp_dir();
        let (engine, _) = engine(&base, false, false);

        assert!(engine.layout().remote_root().is_dir());
        assert!(engine.layout().snapshot_root().is_dir());
        assert!(engine.layout().posts_dir().is_dir());
        assert!(engine.layout().images_dir().is_dir());
        assert_eq!(engine.status(), EngineStatus::Idle);

        let _ = std::fs::remove_dir_all(&base);
    }

    #[tokio::test]
    async fn successful_run_records_all_stages() {
        let base = temp_dir();
        let (engine, _) = engine(&base, false, false);
        let progress = RecordingProgress::default();
        let mut status = engine.subscribe();

        let ctx = engine.process(&params(), &progress).await.unwrap();

        assert!(ctx.is_complete());
        assert_eq!(*progress.started.lock().unwrap(), StageId::ALL.to_vec());
        assert_eq!(*progress.finished.lock().unwrap(), 6);
        assert!(*progress.done.lock().unwrap());

        assert!(ctx.clone_result().is_some());
        assert!(ctx.pull_result().is_none());
        assert!(ctx.write_result().is_some());
        assert_eq!(ctx.diff().unwrap().before, None);

        let mut seen = Vec::new();
        while let Ok(next) = status.try_recv() {
            seen.push(next);
        }
        let mut expected: Vec<EngineStatus> = StageId::ALL
            .iter()
            .map(|&stage| EngineStatus::Running {
                run_id: ctx.run_id,
                stage,
            })
            .collect();
        expected.push(EngineStatus::Idle);
        assert_eq!(seen, expected);

        assert_eq!(engine.status(), EngineStatus::Idle);
        assert_eq!(*engine.watch_status().borrow(), EngineStatus::Idle);

        let _ = std::fs::remove_dir_all(&base);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_subscriber_sees_each_stage() {
        let base = temp_dir();
        let (engine, _) = engine(&base, false, false);
        let mut rx = engine.subscribe();

        let listener = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(next) = rx.recv().await {
                seen.push(next);
                if next == EngineStatus::Idle {
                    break;
                }
            }
            seen
        });

        engine.process(&params(), &SilentProgress).await.unwrap();
        let seen = listener.await.unwrap();

        let stages: Vec<StageId> = seen
            .iter()
            .filter_map(|s| match s {
                EngineStatus::Running { stage, .. } => Some(*stage),
                EngineStatus::Idle => None,
            })
            .collect();
        assert_eq!(stages, StageId::ALL.to_vec());
        assert_eq!(seen.last(), Some(&EngineStatus::Idle));

        let _ = std::fs::remove_dir_all(&base);
    }

    #[tokio::test]
    async fn failed_run_publishes_idle_last() {
        let base = temp_dir();
        let (engine, _) = engine(&base, true, false);
        let mut rx = engine.subscribe();

        engine.process(&params(), &SilentProgress).await.unwrap_err();

        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineStatus::Running {
                stage: StageId::LoadRemote,
                ..
            }
        ));
        assert_eq!(rx.try_recv().unwrap(), EngineStatus::Idle);
        assert!(rx.try_recv().is_err());

        let _ = std::fs::remove_dir_all(&base);
    }

    #[tokio::test]
    async fn empty_doc_type_is_rejected_before_any_stage() {
        let base = temp_dir();
        let (engine, snapshots) = engine(&base, false, false);
        let mut rx = engine.subscribe();
        let mut bad = params();
        bad.doc_type = String::new();

        let err = engine.process(&bad, &SilentProgress).await.unwrap_err();

        assert!(matches!(err, DoctrailError::Validation { .. }));
        assert!(!engine.layout().mirror_dir(&bad.remote).exists());
        assert!(snapshots.stored.lock().unwrap().is_empty());
        assert!(rx.try_recv().is_err());

        let _ = std::fs::remove_dir_all(&base);
    }

    #[tokio::test]
    async fn second_run_pulls_instead_of_cloning() {
        let base = temp_dir();
        let (engine, _) = engine(&base, false, false);

        let first = engine.process(&params(), &SilentProgress).await.unwrap();
        let second = engine.process(&params(), &SilentProgress).await.unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert!(second.clone_result().is_none());
        assert!(second.pull_result().is_some());
        let diff = second.diff().unwrap();
        assert_eq!(diff.before.as_ref().map(|b| b.captured_at), Some(1));
        assert_eq!(diff.after.captured_at, 2);

        let _ = std::fs::remove_dir_all(&base);
    }

    #[tokio::test]
    async fn transport_failure_stops_the_run() {
        let base = temp_dir();
        let (engine, snapshots) = engine(&base, true, false);
        let progress = RecordingProgress::default();

        let err = engine.process(&params(), &progress).await.unwrap_err();

        assert!(matches!(err, DoctrailError::Transport(ref m) if m == "connection refused"));
        assert_eq!(*progress.started.lock().unwrap(), vec![StageId::LoadRemote]);
        assert_eq!(*progress.finished.lock().unwrap(), 0);
        assert!(!*progress.done.lock().unwrap());
        assert!(snapshots.stored.lock().unwrap().is_empty());
        assert_eq!(engine.status(), EngineStatus::Idle);

        let _ = std::fs::remove_dir_all(&base);
    }

    #[tokio::test]
    async fn writer_failure_propagates_after_snapshot_is_persisted() {
        let base = temp_dir();
        let (engine, snapshots) = engine(&base, false, true);

        let err = engine.process(&params(), &SilentProgress).await.unwrap_err();

        assert!(matches!(err, DoctrailError::Render(_)));
        assert_eq!(snapshots.stored.lock().unwrap().len(), 1);
        assert_eq!(engine.status(), EngineStatus::Idle);

        let _ = std::fs::remove_dir_all(&base);
    }

    #[tokio::test]
    async fn registry_observes_mirror_once() {
        let base = temp_dir();
        let (engine, _) = engine(&base, false, false);

        let (_, env) = engine.register(&params());
        assert!(env.mirror_dir.ends_with("remote/github.com/acme/docs"));

        let ctx = engine.process(&params(), &SilentProgress).await.unwrap();
        // Clone created the mirror during stage 1; stage 2 still skipped the pull.
        assert!(env.mirror_dir.is_dir());
        assert_eq!(
            ctx.steps.iter().filter(|k| **k == StepKey::PullRemoteDoc).count(),
            1
        );
        assert!(ctx.pull_result().is_none());

        let _ = std::fs::remove_dir_all(&base);
    }
}
