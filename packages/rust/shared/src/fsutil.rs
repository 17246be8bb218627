//! Small filesystem helpers shared by the snapshot store and post writer.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{DoctrailError, Result};

/// Create `dir` and all of its parents.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| DoctrailError::io(dir, e))
}

/// Write `contents` to `path` via a sibling temp file and a rename, creating
/// parent directories as needed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| DoctrailError::validation(format!("{} has no parent", path.display())))?;
    ensure_dir(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, contents).map_err(|e| DoctrailError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| DoctrailError::io(path, e))?;
    Ok(())
}

/// Write a JSON file (pretty-printed) atomically.
pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| DoctrailError::validation(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, json.as_bytes())?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| DoctrailError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| DoctrailError::validation(format!("invalid JSON in {}: {e}", path.display())))
}
