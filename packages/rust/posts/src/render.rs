//! Markdown post writer.
//!
//! Layout under the posts directory:
//! ```text
//! <posts_dir>/<user>/<repository>/
//! ├── .doctrail-posts.json   posts generated by the last write
//! ├── README.md
//! └── guide/install.md
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use doctrail_shared::{DoctrailError, DocumentNode, Result, Snapshot, fsutil};

use crate::{PostTargets, PostWriter, WriteResult};

/// Index of generated posts, kept next to them.
const INDEX_FILE: &str = ".doctrail-posts.json";

/// Leading YAML frontmatter block, including the closing fence.
static FRONTMATTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---\r?\n.*?\r?\n---[ \t]*(\r?\n|\z)").expect("valid regex"));

static FINGERPRINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^fingerprint:\s*"([0-9a-f]+)"\s*$"#).expect("valid regex"));

/// Writes one Markdown post per snapshot document.
#[derive(Debug, Clone, Default)]
pub struct MarkdownPostWriter;

impl MarkdownPostWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PostWriter for MarkdownPostWriter {
    #[instrument(skip_all, fields(name = %snapshot.name, documents = snapshot.documents.len()))]
    async fn write_posts(&self, snapshot: &Snapshot, targets: &PostTargets) -> Result<WriteResult> {
        let out_dir = targets.posts_dir.join(name_dir(&snapshot.name));
        fsutil::ensure_dir(&out_dir)?;

        let mut result = WriteResult {
            posts_dir: out_dir.clone(),
            ..WriteResult::default()
        };
        let mut current = BTreeSet::new();

        let rels = assign_post_paths(&snapshot.documents);
        for (doc, rel) in snapshot.documents.iter().zip(rels) {
            let target = out_dir.join(&rel);
            current.insert(rel.clone());

            if recorded_fingerprint(&target).as_deref() == Some(doc.content_fingerprint.as_str()) {
                result.unchanged.push(rel);
                continue;
            }

            let source = targets.remote_dir.join(&doc.path);
            let bytes = std::fs::read(&source).map_err(|e| {
                DoctrailError::render(format!("cannot read source {}: {e}", source.display()))
            })?;
            let post = render_post(doc, &String::from_utf8_lossy(&bytes), snapshot.captured_at);

            fsutil::write_atomic(&target, post.as_bytes())?;
            debug!(post = %rel, "wrote post");
            result.written.push(rel);
        }

        result.removed = prune_stale(&out_dir, &current)?;
        fsutil::write_json(&out_dir.join(INDEX_FILE), &current)?;

        info!(
            written = result.written.len(),
            unchanged = result.unchanged.len(),
            removed = result.removed.len(),
            "posts refreshed"
        );

        Ok(result)
    }
}

/// Post location for a document path: same directories, `.md` extension.
pub fn post_path(doc_path: &str) -> String {
    let path = Path::new(doc_path).with_extension("md");
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Post paths for `documents`, in order, with no two alike.
///
/// A document whose [`post_path`] is already claimed by an earlier one gets
/// `<stem>-<n>.md` with the smallest `n >= 2` that no document maps to
/// naturally. Snapshot documents are sorted, so the choice is stable across
/// runs.
pub fn assign_post_paths(documents: &[DocumentNode]) -> Vec<String> {
    let natural: Vec<String> = documents.iter().map(|d| post_path(&d.path)).collect();
    let reserved: BTreeSet<&str> = natural.iter().map(String::as_str).collect();
    let mut taken = BTreeSet::new();
    let mut assigned = Vec::with_capacity(natural.len());

    for (doc, rel) in documents.iter().zip(&natural) {
        if taken.insert(rel.clone()) {
            assigned.push(rel.clone());
            continue;
        }

        let stem = rel.strip_suffix(".md").unwrap_or(rel);
        let mut n = 2;
        let unique = loop {
            let candidate = format!("{stem}-{n}.md");
            if !reserved.contains(candidate.as_str()) && !taken.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        warn!(source = %doc.path, post = %unique, "post path already taken");
        taken.insert(unique.clone());
        assigned.push(unique);
    }
    assigned
}

/// Human title from the last path segment (`getting-started.md` → `Getting Started`).
pub fn title_from_path(path: &str) -> String {
    let segment = path.rsplit('/').next().unwrap_or(path);
    let stem = segment.split('.').next().unwrap_or(segment);

    if stem.eq_ignore_ascii_case("index") || stem.eq_ignore_ascii_case("readme") {
        return "Overview".to_string();
    }

    stem.replace(['-', '_'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => {
                    let upper: String = c.to_uppercase().collect();
                    format!("{upper}{}", chars.collect::<String>())
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Directory for a snapshot name, dropping empty and dot segments.
fn name_dir(name: &str) -> PathBuf {
    name.split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect()
}

fn render_post(doc: &DocumentNode, source: &str, captured_at: i64) -> String {
    let title = doc
        .metadata
        .title
        .clone()
        .unwrap_or_else(|| title_from_path(&doc.path));
    let captured = DateTime::<Utc>::from_timestamp_millis(captured_at)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default();

    let body = FRONTMATTER_RE.replace(source, "");
    let body = body.trim_start_matches(['\r', '\n']);

    let mut post = String::from("---\n");
    post.push_str(&format!("title: \"{}\"\n", escape_yaml_string(&title)));
    post.push_str(&format!("source: \"{}\"\n", escape_yaml_string(&doc.path)));
    post.push_str(&format!("fingerprint: \"{}\"\n", doc.content_fingerprint));
    post.push_str(&format!("captured_at: \"{captured}\"\n"));
    post.push_str("---\n\n");
    post.push_str(body);
    if !post.ends_with('\n') {
        post.push('\n');
    }
    post
}

/// Fingerprint recorded in an existing post's frontmatter.
fn recorded_fingerprint(post: &Path) -> Option<String> {
    let content = std::fs::read_to_string(post).ok()?;
    let frontmatter = FRONTMATTER_RE.find(&content)?;
    FINGERPRINT_RE
        .captures(frontmatter.as_str())
        .map(|c| c[1].to_string())
}

/// Delete posts listed in the previous index that are no longer generated.
fn prune_stale(out_dir: &Path, current: &BTreeSet<String>) -> Result<Vec<String>> {
    let index_path = out_dir.join(INDEX_FILE);
    if !index_path.exists() {
        return Ok(Vec::new());
    }

    let previous: BTreeSet<String> = match fsutil::read_json(&index_path) {
        Ok(previous) => previous,
        Err(e) => {
            warn!(path = %index_path.display(), error = %e, "ignoring unreadable post index");
            return Ok(Vec::new());
        }
    };

    let mut removed = Vec::new();
    for rel in previous.difference(current) {
        let path = out_dir.join(rel);
        match std::fs::remove_file(&path) {
            Ok(()) => removed.push(rel.clone()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DoctrailError::io(&path, e)),
        }
    }
    Ok(removed)
}

/// Escape special characters in a YAML string value.
fn escape_yaml_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
