//! Filesystem-backed [`SnapshotReader`].

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use walkdir::{DirEntry, WalkDir};

use doctrail_shared::{
    CURRENT_SCHEMA_VERSION, DoctrailError, DocumentMeta, DocumentNode, Result, Snapshot,
};

use crate::store;
use crate::{PersistedSnapshot, SnapshotOptions, SnapshotReader};

/// YAML frontmatter block at the very start of a document.
static FRONTMATTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---\r?\n(.*?)\r?\n---").expect("valid regex"));

/// `title:` line inside frontmatter, optionally quoted.
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^title:\s*["']?(.*?)["']?\s*$"#).expect("valid regex")
});

/// First ATX level-1 heading.
static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+?)\s*#*\s*$").expect("valid regex"));

/// Snapshots a mirror on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsSnapshotReader;

impl FsSnapshotReader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SnapshotReader for FsSnapshotReader {
    #[instrument(skip_all, fields(source = %source.display(), doc_type = %options.doc_type))]
    async fn create_snapshot(&self, source: &Path, options: &SnapshotOptions) -> Result<Snapshot> {
        if !source.is_dir() {
            return Err(DoctrailError::snapshot(format!(
                "source {} is not a directory",
                source.display()
            )));
        }

        let extension = options.doc_type.trim_start_matches('.');
        let mut documents = Vec::new();

        let walker = WalkDir::new(source)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = entry.map_err(|e| {
                DoctrailError::snapshot(format!("cannot walk {}: {e}", source.display()))
            })?;
            if !entry.file_type().is_file() || !has_extension(entry.path(), extension) {
                continue;
            }
            documents.push(read_document(source, entry.path())?);
        }

        documents.sort_by(|a, b| a.path.cmp(&b.path));

        info!(documents = documents.len(), "snapshot captured");

        Ok(Snapshot {
            schema_version: CURRENT_SCHEMA_VERSION,
            doc_type: extension.to_string(),
            name: options.name.clone(),
            captured_at: Utc::now().timestamp_millis(),
            documents,
        })
    }

    #[instrument(skip_all, fields(root = %root.display(), name = %snapshot.name))]
    async fn persist_snapshot(&self, root: &Path, mut snapshot: Snapshot) -> Result<PersistedSnapshot> {
        let latest = store::latest_capture(root)?;
        snapshot.captured_at = store::next_capture_timestamp(snapshot.captured_at, latest);

        let path = store::write_snapshot(root, &snapshot)?;
        info!(path = %path.display(), captured_at = snapshot.captured_at, "snapshot persisted");

        Ok(PersistedSnapshot { snapshot, path })
    }

    #[instrument(skip_all, fields(root = %root.display()))]
    async fn read_last_snapshot(&self, root: &Path, name: Option<&str>) -> Result<Option<Snapshot>> {
        let found = store::find_last(root, name)?;
        debug!(
            found = found.is_some(),
            captured_at = found.as_ref().map(|s| s.captured_at),
            "last snapshot lookup"
        );
        Ok(found)
    }
}

/// SHA-256 hex digest of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Frontmatter `title:` if present, otherwise the first `# ` heading.
pub fn extract_title(content: &str) -> Option<String> {
    let from_frontmatter = FRONTMATTER_RE
        .captures(content)
        .and_then(|fm| TITLE_RE.captures(fm.get(1)?.as_str()))
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty());

    from_frontmatter.or_else(|| {
        H1_RE
            .captures(content)
            .map(|c| c[1].trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

fn read_document(source: &Path, path: &Path) -> Result<DocumentNode> {
    let bytes = std::fs::read(path).map_err(|e| DoctrailError::io(path, e))?;
    let relative = path.strip_prefix(source).map_err(|_| {
        DoctrailError::snapshot(format!("{} is outside {}", path.display(), source.display()))
    })?;

    let rel_path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let title = std::str::from_utf8(&bytes).ok().and_then(extract_title);

    debug!(path = %rel_path, size = bytes.len(), "fingerprinted document");

    Ok(DocumentNode {
        path: rel_path,
        content_fingerprint: fingerprint(&bytes),
        metadata: DocumentMeta {
            title,
            size_bytes: bytes.len() as u64,
        },
    })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dt-reader-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn make_tree() -> PathBuf {
        let root = temp_dir();
        write(&root, "README.md", "# Acme Docs\n\nWelcome.\n");
        write(
            &root,
            "guide/install.MD",
            "---\ntitle: \"Installing\"\n---\n\n# Install\n",
        );
        write(&root, "guide/notes.txt", "not a doc");
        write(&root, ".git/HEAD.md", "# hidden");
        write(&root, ".github/TEMPLATE.md", "# hidden too");
        root
    }

    fn options() -> SnapshotOptions {
        SnapshotOptions {
            doc_type: "md".into(),
            name: "acme/docs".into(),
        }
    }

    #[tokio::test]
    async fn captures_matching_documents_only() {
        let root = make_tree();
        let snap = FsSnapshotReader::new()
            .create_snapshot(&root, &options())
            .await
            .unwrap();

        let paths: Vec<&str> = snap.documents.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "guide/install.MD"]);
        assert_eq!(snap.doc_type, "md");
        assert_eq!(snap.name, "acme/docs");
        assert_eq!(snap.documents[0].metadata.title.as_deref(), Some("Acme Docs"));
        assert_eq!(snap.documents[1].metadata.title.as_deref(), Some("Installing"));
        assert_eq!(
            snap.documents[0].content_fingerprint,
            fingerprint(b"# Acme Docs\n\nWelcome.\n")
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fingerprints_are_stable_across_captures() {
        let root = make_tree();
        let reader = FsSnapshotReader::new();
        let first = reader.create_snapshot(&root, &options()).await.unwrap();
        let second = reader.create_snapshot(&root, &options()).await.unwrap();

        assert_eq!(first.documents, second.documents);
        let diff = reader.diff_snapshot(Some(&first), &second).unwrap();
        assert!(!diff.has_changes());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn missing_source_is_an_error() {
        let root = std::env::temp_dir().join(format!("dt-reader-missing-{}", uuid::Uuid::now_v7()));
        let err = FsSnapshotReader::new()
            .create_snapshot(&root, &options())
            .await
            .unwrap_err();
        assert!(matches!(err, DoctrailError::Snapshot(_)));
    }

    #[tokio::test]
    async fn persisted_snapshot_is_read_back_as_last() {
        let source = make_tree();
        let store_root = temp_dir();
        let reader = FsSnapshotReader::new();

        assert!(reader.read_last_snapshot(&store_root, None).await.unwrap().is_none());

        let snap = reader.create_snapshot(&source, &options()).await.unwrap();
        let first = reader.persist_snapshot(&store_root, snap.clone()).await.unwrap();
        assert!(first.path.exists());

        // Same wall-clock timestamp again: must still land strictly later.
        let second = reader.persist_snapshot(&store_root, snap).await.unwrap();
        assert!(second.snapshot.captured_at > first.snapshot.captured_at);

        let last = reader
            .read_last_snapshot(&store_root, Some("acme/docs"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last, second.snapshot);

        let _ = std::fs::remove_dir_all(&source);
        let _ = std::fs::remove_dir_all(&store_root);
    }

    #[test]
    fn title_extraction() {
        assert_eq!(extract_title("# Hello\nbody"), Some("Hello".into()));
        assert_eq!(extract_title("intro\n\n# Later  #\n"), Some("Later".into()));
        assert_eq!(
            extract_title("---\ntitle: 'Quoted'\nslug: x\n---\n# Heading\n"),
            Some("Quoted".into())
        );
        assert_eq!(extract_title("---\nslug: x\n---\n# Heading\n"), Some("Heading".into()));
        assert_eq!(extract_title("## Only h2\n"), None);
    }
}
