//! Date-partitioned snapshot store.
//!
//! Snapshots live at `<root>/<YYYY>/<MM>/<DD>/<captured_at>.json`. The store is
//! append-only; nothing here prunes old captures.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use doctrail_shared::{CURRENT_SCHEMA_VERSION, DoctrailError, Result, Snapshot, fsutil, snapshot_file};

/// A snapshot file found in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub captured_at: i64,
    pub path: PathBuf,
}

/// All snapshot files under `root`, oldest first.
///
/// Only `<YYYY>/<MM>/<DD>/<digits>.json` files count; anything else in the tree
/// is ignored. A missing root yields an empty list.
pub fn list_snapshots(root: &Path) -> Result<Vec<SnapshotEntry>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(4).max_depth(4) {
        let entry = entry.map_err(|e| {
            DoctrailError::snapshot(format!("cannot scan {}: {e}", root.display()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(captured_at) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse::<i64>().ok())
        else {
            debug!(path = %path.display(), "ignoring non-snapshot file");
            continue;
        };

        entries.push(SnapshotEntry {
            captured_at,
            path: path.to_path_buf(),
        });
    }

    entries.sort_by_key(|e| e.captured_at);
    Ok(entries)
}

/// Highest capture timestamp in the store.
pub fn latest_capture(root: &Path) -> Result<Option<i64>> {
    Ok(list_snapshots(root)?.last().map(|e| e.captured_at))
}

/// Smallest timestamp that is not earlier than `now` and strictly after `latest`.
pub fn next_capture_timestamp(now: i64, latest: Option<i64>) -> i64 {
    match latest {
        Some(latest) if latest >= now => latest + 1,
        _ => now,
    }
}

/// Read one snapshot file.
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let snapshot: Snapshot = fsutil::read_json(path)
        .map_err(|e| DoctrailError::snapshot(format!("cannot load {}: {e}", path.display())))?;

    if snapshot.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(DoctrailError::snapshot(format!(
            "{}: unsupported schema_version {} (expected {})",
            path.display(),
            snapshot.schema_version,
            CURRENT_SCHEMA_VERSION
        )));
    }
    Ok(snapshot)
}

/// Write `snapshot` to its date-partitioned path and return that path.
pub fn write_snapshot(root: &Path, snapshot: &Snapshot) -> Result<PathBuf> {
    let path = snapshot_file(root, snapshot.captured_at)?;
    if path.exists() {
        return Err(DoctrailError::snapshot(format!(
            "snapshot {} already exists",
            path.display()
        )));
    }
    fsutil::write_json(&path, snapshot)?;
    Ok(path)
}

/// Newest snapshot under `root`, optionally restricted to one name.
///
/// Files that fail to parse or carry an unknown schema are logged and
/// skipped, so the search falls back to the next older capture.
pub fn find_last(root: &Path, name: Option<&str>) -> Result<Option<Snapshot>> {
    for entry in list_snapshots(root)?.iter().rev() {
        let snapshot = match load_snapshot(&entry.path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "skipping unreadable snapshot");
                continue;
            }
        };
        if snapshot.captured_at != entry.captured_at {
            warn!(
                path = %entry.path.display(),
                recorded = snapshot.captured_at,
                "snapshot file name and captured_at disagree"
            );
        }
        match name {
            Some(name) if snapshot.name != name => continue,
            _ => return Ok(Some(snapshot)),
        }
    }
    Ok(None)
}
