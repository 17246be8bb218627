//! Result context and step ledger threaded through one pipeline run.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use doctrail_posts::WriteResult;
use doctrail_shared::{ProcessParams, Remote, RunId, Snapshot, SnapshotDiff};
use doctrail_vcs::{CloneResult, PullResult};

// ---------------------------------------------------------------------------
// Step identity
// ---------------------------------------------------------------------------

/// Ledger slot a stage records into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKey {
    LoadRemoteDoc,
    PullRemoteDoc,
    ReadLastDocSnapshot,
    CreateDocSnapshot,
    DiffDocSnapshot,
}

impl StepKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoadRemoteDoc => "LOAD_REMOTE_DOC",
            Self::PullRemoteDoc => "PULL_REMOTE_DOC",
            Self::ReadLastDocSnapshot => "READ_LAST_DOC_SNAPSHOT",
            Self::CreateDocSnapshot => "CREATE_DOC_SNAPSHOT",
            Self::DiffDocSnapshot => "DIFF_DOC_SNAPSHOT",
        }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six pipeline stages, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    LoadRemote,
    PullRemote,
    ReadLastSnapshot,
    CreateSnapshot,
    DiffSnapshots,
    RefreshOutput,
}

impl StageId {
    pub const ALL: [StageId; 6] = [
        Self::LoadRemote,
        Self::PullRemote,
        Self::ReadLastSnapshot,
        Self::CreateSnapshot,
        Self::DiffSnapshots,
        Self::RefreshOutput,
    ];

    /// Ledger slot for this stage.
    ///
    /// `RefreshOutput` shares `CREATE_DOC_SNAPSHOT` with `CreateSnapshot`, so
    /// its entry replaces the snapshot entry in the step map while the key is
    /// listed twice in `steps`.
    pub const fn ledger_key(self) -> StepKey {
        match self {
            Self::LoadRemote => StepKey::LoadRemoteDoc,
            Self::PullRemote => StepKey::PullRemoteDoc,
            Self::ReadLastSnapshot => StepKey::ReadLastDocSnapshot,
            Self::CreateSnapshot | Self::RefreshOutput => StepKey::CreateDocSnapshot,
            Self::DiffSnapshots => StepKey::DiffDocSnapshot,
        }
    }

    /// Short human label for progress output.
    pub const fn label(self) -> &'static str {
        match self {
            Self::LoadRemote => "Loading remote",
            Self::PullRemote => "Pulling remote",
            Self::ReadLastSnapshot => "Reading last snapshot",
            Self::CreateSnapshot => "Creating snapshot",
            Self::DiffSnapshots => "Diffing snapshots",
            Self::RefreshOutput => "Refreshing posts",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Ledger entries
// ---------------------------------------------------------------------------

/// Stage-specific outcome stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StepPayload {
    Clone(Option<CloneResult>),
    Pull(Option<PullResult>),
    LastSnapshot(Option<Snapshot>),
    Snapshot(Snapshot),
    Diff(SnapshotDiff),
    Posts(WriteResult),
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: StepKey,
    /// Stage that produced the entry. Disambiguates the shared snapshot slot.
    pub stage: StageId,
    pub success: bool,
    pub data: StepPayload,
}

// ---------------------------------------------------------------------------
// ResultContext
// ---------------------------------------------------------------------------

/// Accumulator for one run. Each stage takes it by value and hands it back
/// with one more ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultContext {
    pub run_id: RunId,
    /// Ledger keys in execution order.
    pub steps: Vec<StepKey>,
    /// Latest entry per key.
    pub step_map: BTreeMap<StepKey, StepResult>,
    pub remote: Remote,
    pub doc_type: String,
}

impl ResultContext {
    pub fn new(run_id: RunId, params: &ProcessParams) -> Self {
        Self {
            run_id,
            steps: Vec::new(),
            step_map: BTreeMap::new(),
            remote: params.remote.clone(),
            doc_type: params.doc_type.clone(),
        }
    }

    /// Append a ledger entry for `stage`.
    pub fn record(mut self, stage: StageId, success: bool, data: StepPayload) -> Self {
        let step = stage.ledger_key();
        self.steps.push(step);
        self.step_map.insert(
            step,
            StepResult {
                step,
                stage,
                success,
                data,
            },
        );
        self
    }

    pub fn step(&self, key: StepKey) -> Option<&StepResult> {
        self.step_map.get(&key)
    }

    /// Whether every registered stage has recorded an entry.
    pub fn is_complete(&self) -> bool {
        self.steps.len() == StageId::ALL.len()
    }

    pub fn clone_result(&self) -> Option<&CloneResult> {
        match &self.step(StepKey::LoadRemoteDoc)?.data {
            StepPayload::Clone(result) => result.as_ref(),
            _ => None,
        }
    }

    pub fn pull_result(&self) -> Option<&PullResult> {
        match &self.step(StepKey::PullRemoteDoc)?.data {
            StepPayload::Pull(result) => result.as_ref(),
            _ => None,
        }
    }

    /// Snapshot found by the read stage.
    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        match &self.step(StepKey::ReadLastDocSnapshot)?.data {
            StepPayload::LastSnapshot(snapshot) => snapshot.as_ref(),
            _ => None,
        }
    }

    /// Snapshot recorded by the create stage. `None` once the refresh stage
    /// has replaced that entry.
    pub fn created_snapshot(&self) -> Option<&Snapshot> {
        match &self.step(StepKey::CreateDocSnapshot)?.data {
            StepPayload::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn diff(&self) -> Option<&SnapshotDiff> {
        match &self.step(StepKey::DiffDocSnapshot)?.data {
            StepPayload::Diff(diff) => Some(diff),
            _ => None,
        }
    }

    pub fn write_result(&self) -> Option<&WriteResult> {
        match &self.step(StepKey::CreateDocSnapshot)?.data {
            StepPayload::Posts(result) => Some(result),
            _ => None,
        }
    }
}
