//! Core domain types: remotes, run parameters, snapshots, and diffs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DoctrailError, Result};

/// Current schema version for persisted snapshot files.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Remote / ProcessParams
// ---------------------------------------------------------------------------

/// The remote source repository being mirrored and tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Remote {
    /// Owner (user or organisation) on the provider.
    pub user: String,
    /// Repository name.
    pub repository: String,
}

impl Remote {
    /// Build a remote, rejecting segments that cannot be used as a path component.
    pub fn new(user: impl Into<String>, repository: impl Into<String>) -> Result<Self> {
        let remote = Self {
            user: user.into(),
            repository: repository.into(),
        };
        validate_segment("user", &remote.user)?;
        validate_segment("repository", &remote.repository)?;
        Ok(remote)
    }
}

fn validate_segment(field: &str, value: &str) -> Result<()> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(DoctrailError::validation(format!(
            "remote {field} '{value}' is not a valid name"
        )));
    }
    if value.contains(['/', '\\']) || value.chars().any(char::is_whitespace) {
        return Err(DoctrailError::validation(format!(
            "remote {field} '{value}' must not contain separators or whitespace"
        )));
    }
    Ok(())
}

impl std::fmt::Display for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user, self.repository)
    }
}

impl std::str::FromStr for Remote {
    type Err = DoctrailError;

    fn from_str(s: &str) -> Result<Self> {
        let (user, repository) = s.trim().split_once('/').ok_or_else(|| {
            DoctrailError::validation(format!("expected <user>/<repository>, got '{s}'"))
        })?;
        Self::new(user, repository.trim_end_matches(".git"))
    }
}

/// Input to one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessParams {
    /// Which repository to mirror.
    pub remote: Remote,
    /// Document type to capture, as a file extension (e.g. `md`).
    pub doc_type: String,
}

impl ProcessParams {
    /// Build run parameters, rejecting a doc type that would match nothing.
    pub fn new(remote: Remote, doc_type: impl Into<String>) -> Result<Self> {
        let params = Self {
            remote,
            doc_type: doc_type.into(),
        };
        params.validate()?;
        Ok(params)
    }

    /// Require `doc_type` to be one non-empty file extension, with an
    /// optional leading dot.
    pub fn validate(&self) -> Result<()> {
        let extension = self.doc_type.trim_start_matches('.');
        if extension.is_empty() {
            return Err(DoctrailError::validation(format!(
                "doc_type for {} must not be empty",
                self.remote
            )));
        }
        if extension.contains(['/', '\\', '.']) || extension.chars().any(char::is_whitespace) {
            return Err(DoctrailError::validation(format!(
                "doc_type '{}' must be a single file extension",
                self.doc_type
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A timestamped capture of a document tree's content fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Document type the snapshot was filtered on.
    pub doc_type: String,
    /// Human-readable name, usually `<user>/<repository>`.
    pub name: String,
    /// Capture time in milliseconds since the Unix epoch.
    pub captured_at: i64,
    /// Captured documents, sorted by path.
    pub documents: Vec<DocumentNode>,
}

impl Snapshot {
    /// Lightweight reference used in diffs and listings.
    pub fn reference(&self) -> SnapshotRef {
        SnapshotRef {
            name: self.name.clone(),
            captured_at: self.captured_at,
        }
    }
}

/// One document within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNode {
    /// Path relative to the mirror root, `/`-separated.
    pub path: String,
    /// SHA-256 hex digest of the file bytes.
    pub content_fingerprint: String,
    /// Extracted metadata.
    #[serde(default)]
    pub metadata: DocumentMeta,
}

/// Metadata extracted from a document. Never includes filesystem timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Frontmatter `title:` or first `# ` heading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// Identifies a snapshot without carrying its documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub name: String,
    pub captured_at: i64,
}

// ---------------------------------------------------------------------------
// SnapshotDiff
// ---------------------------------------------------------------------------

/// Classification of documents between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// The earlier snapshot, `None` on a first run.
    pub before: Option<SnapshotRef>,
    /// The snapshot just captured.
    pub after: SnapshotRef,
    /// Documents only present in `after`.
    pub added: Vec<DocumentNode>,
    /// Documents only present in `before`.
    pub removed: Vec<DocumentNode>,
    /// Documents whose fingerprint changed (the `after` version).
    pub modified: Vec<DocumentNode>,
    /// Documents with identical fingerprints.
    pub unchanged: Vec<DocumentNode>,
}

impl SnapshotDiff {
    /// Whether anything was added, removed, or modified.
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty())
    }

    /// Paths touched by this diff (added, modified, and removed), sorted.
    pub fn changed_paths(&self) -> BTreeSet<&str> {
        self.added
            .iter()
            .chain(&self.modified)
            .chain(&self.removed)
            .map(|d| d.path.as_str())
            .collect()
    }

    /// Compare two snapshots by document path and fingerprint.
    ///
    /// With no `before` snapshot every document in `after` is `added`.
    pub fn between(before: Option<&Snapshot>, after: &Snapshot) -> Self {
        let mut diff = Self {
            before: before.map(Snapshot::reference),
            after: after.reference(),
            added: Vec::new(),
            removed: Vec::new(),
            modified: Vec::new(),
            unchanged: Vec::new(),
        };

        let Some(before) = before else {
            diff.added = after.documents.clone();
            return diff;
        };

        let before_by_path: BTreeMap<&str, &DocumentNode> = before
            .documents
            .iter()
            .map(|d| (d.path.as_str(), d))
            .collect();
        let after_paths: BTreeSet<&str> = after.documents.iter().map(|d| d.path.as_str()).collect();

        for doc in &after.documents {
            match before_by_path.get(doc.path.as_str()) {
                Some(old) if old.content_fingerprint == doc.content_fingerprint => {
                    diff.unchanged.push(doc.clone());
                }
                Some(_) => diff.modified.push(doc.clone()),
                None => diff.added.push(doc.clone()),
            }
        }

        for old in &before.documents {
            if !after_paths.contains(old.path.as_str()) {
                diff.removed.push(old.clone());
            }
        }

        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str, hash: &str) -> DocumentNode {
        DocumentNode {
            path: path.into(),
            content_fingerprint: hash.into(),
            metadata: DocumentMeta::default(),
        }
    }

    fn snapshot(captured_at: i64, docs: Vec<DocumentNode>) -> Snapshot {
        Snapshot {
            schema_version: CURRENT_SCHEMA_VERSION,
            doc_type: "md".into(),
            name: "acme/docs".into(),
            captured_at,
            documents: docs,
        }
    }

    #[test]
    fn remote_parses_user_and_repository() {
        let remote: Remote = "acme/docs".parse().expect("parse remote");
        assert_eq!(remote.user, "acme");
        assert_eq!(remote.repository, "docs");
        assert_eq!(remote.to_string(), "acme/docs");

        let remote: Remote = "acme/docs.git".parse().expect("parse remote");
        assert_eq!(remote.repository, "docs");
    }

    #[test]
    fn remote_rejects_bad_segments() {
        assert!("acme".parse::<Remote>().is_err());
        assert!("acme/".parse::<Remote>().is_err());
        assert!("acme/../etc".parse::<Remote>().is_err());
        assert!(Remote::new("..", "docs").is_err());
        assert!(Remote::new("ac me", "docs").is_err());
    }

    #[test]
    fn process_params_reject_unusable_doc_types() {
        let remote = Remote::new("acme", "docs").unwrap();
        assert!(ProcessParams::new(remote.clone(), "md").is_ok());
        assert!(ProcessParams::new(remote.clone(), ".mdx").is_ok());

        for doc_type in ["", "  ", ".", "md/x", "tar.gz"] {
            let err = ProcessParams::new(remote.clone(), doc_type).unwrap_err();
            assert!(matches!(err, DoctrailError::Validation { .. }), "{doc_type:?}");
        }
    }

    #[test]
    fn diff_without_before_marks_everything_added() {
        let after = snapshot(2, vec![doc("a.md", "h1"), doc("b.md", "h2")]);
        let diff = SnapshotDiff::between(None, &after);

        assert!(diff.before.is_none());
        assert_eq!(diff.added.len(), 2);
        assert!(diff.removed.is_empty());
        assert!(diff.modified.is_empty());
        assert!(diff.unchanged.is_empty());
        assert!(diff.has_changes());
    }

    #[test]
    fn diff_mixed_scenario() {
        let before = snapshot(
            1,
            vec![doc("page-a.md", "ha"), doc("page-b.md", "hb"), doc("page-c.md", "hc")],
        );
        let after = snapshot(
            2,
            vec![
                doc("page-a.md", "ha"),         // unchanged
                doc("page-b.md", "hb-changed"), // modified
                doc("page-d.md", "hd"),         // added
            ],
        );

        let diff = SnapshotDiff::between(Some(&before), &after);
        assert_eq!(diff.before.as_ref().map(|r| r.captured_at), Some(1));
        assert_eq!(diff.after.captured_at, 2);
        assert_eq!(diff.unchanged[0].path, "page-a.md");
        assert_eq!(diff.modified[0].content_fingerprint, "hb-changed");
        assert_eq!(diff.added[0].path, "page-d.md");
        assert_eq!(diff.removed[0].path, "page-c.md");

        let changed: Vec<_> = diff.changed_paths().into_iter().collect();
        assert_eq!(changed, vec!["page-b.md", "page-c.md", "page-d.md"]);
    }

    #[test]
    fn diff_of_identical_snapshots_has_no_changes() {
        let before = snapshot(1, vec![doc("a.md", "h1")]);
        let after = snapshot(2, vec![doc("a.md", "h1")]);

        let diff = SnapshotDiff::between(Some(&before), &after);
        assert!(!diff.has_changes());
        assert_eq!(diff.unchanged.len(), 1);
    }

    #[test]
    fn snapshot_serialization() {
        let snap = snapshot(
            1_700_000_000_000,
            vec![DocumentNode {
                path: "guide/install.md".into(),
                content_fingerprint: "abc".into(),
                metadata: DocumentMeta {
                    title: Some("Install".into()),
                    size_bytes: 42,
                },
            }],
        );

        let json = serde_json::to_string_pretty(&snap).expect("serialize");
        let parsed: Snapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, snap);
    }
}
