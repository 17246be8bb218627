//! Versioned documentation snapshots.
//!
//! This crate provides:
//! - [`SnapshotReader`] — the create/persist/read/diff contract the pipeline uses
//! - [`FsSnapshotReader`] — walks a mirror, fingerprints documents with SHA-256,
//!   and stores snapshots in a date-partitioned JSON tree
//! - [`store`] — lookup helpers over that tree

mod reader;
pub mod store;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use doctrail_shared::{Result, Snapshot, SnapshotDiff};

pub use reader::{FsSnapshotReader, extract_title, fingerprint};
pub use store::SnapshotEntry;

/// What to capture from a source tree.
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    /// File extension to capture (`md`, `mdx`, ...). A leading dot is ignored.
    pub doc_type: String,
    /// Snapshot name, usually `<user>/<repository>`.
    pub name: String,
}

/// A snapshot after it has been written to the store.
#[derive(Debug, Clone)]
pub struct PersistedSnapshot {
    pub snapshot: Snapshot,
    pub path: PathBuf,
}

/// Snapshot capture, persistence, lookup, and comparison.
#[async_trait]
pub trait SnapshotReader: Send + Sync {
    /// Capture the documents under `source`. Fingerprints are deterministic
    /// for identical content.
    async fn create_snapshot(&self, source: &Path, options: &SnapshotOptions) -> Result<Snapshot>;

    /// Write `snapshot` under `root`, bumping its capture timestamp past the
    /// newest snapshot already stored so timestamps strictly increase.
    async fn persist_snapshot(&self, root: &Path, snapshot: Snapshot) -> Result<PersistedSnapshot>;

    /// Load the snapshot with the highest capture timestamp under `root`,
    /// restricted to snapshots called `name` when given. `None` when nothing
    /// matches.
    async fn read_last_snapshot(&self, root: &Path, name: Option<&str>) -> Result<Option<Snapshot>>;

    /// Classify documents between `before` and `after`; with no `before`,
    /// everything in `after` is added.
    fn diff_snapshot(&self, before: Option<&Snapshot>, after: &Snapshot) -> Result<SnapshotDiff> {
        Ok(SnapshotDiff::between(before, after))
    }
}
