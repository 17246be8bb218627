//! Application configuration for doctrail.
//!
//! User config lives at `~/.doctrail/doctrail.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DoctrailError, Result};
use crate::types::{ProcessParams, Remote};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "doctrail.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".doctrail";

// ---------------------------------------------------------------------------
// Config structs (matching doctrail.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Version-control transport settings.
    #[serde(default)]
    pub git: GitConfig,

    /// Tracked remotes, processed in order by `doctrail track`.
    #[serde(default)]
    pub remotes: Vec<RemoteEntry>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Base directory holding mirrors, snapshots, and output.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Document type (file extension) captured when a remote does not set one.
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            doc_type: default_doc_type(),
        }
    }
}

fn default_base_dir() -> String {
    "~/.doctrail/data".into()
}
fn default_doc_type() -> String {
    "md".into()
}

/// `[git]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Path or name of the git executable.
    #[serde(default = "default_git_binary")]
    pub binary: String,

    /// Provider name, used as a directory segment under `remote/`.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL that `<user>/<repository>.git` is appended to.
    #[serde(default = "default_provider_url")]
    pub provider_url: String,

    /// Shallow clone depth; full history when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_depth: Option<u32>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_git_binary(),
            provider: default_provider(),
            provider_url: default_provider_url(),
            clone_depth: None,
        }
    }
}

fn default_git_binary() -> String {
    "git".into()
}
fn default_provider() -> String {
    "github.com".into()
}
fn default_provider_url() -> String {
    "https://github.com".into()
}

/// `[[remotes]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub user: String,
    pub repository: String,
    /// Overrides `defaults.doc_type` for this remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
}

impl AppConfig {
    /// Resolve `defaults.base_dir`, expanding a leading `~`.
    pub fn base_dir(&self) -> Result<PathBuf> {
        expand_home(&self.defaults.base_dir)
    }

    /// Turn every `[[remotes]]` entry into run parameters.
    pub fn tracked(&self) -> Result<Vec<ProcessParams>> {
        self.remotes
            .iter()
            .map(|entry| {
                let remote = Remote::new(&entry.user, &entry.repository)?;
                let doc_type = entry
                    .doc_type
                    .clone()
                    .unwrap_or_else(|| self.defaults.doc_type.clone());
                ProcessParams::new(remote, doc_type)
            })
            .collect()
    }
}

/// Expand a leading `~` or `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            let home = dirs::home_dir()
                .ok_or_else(|| DoctrailError::config("could not determine home directory"))?;
            Ok(home.join(rest.trim_start_matches('/')))
        }
        _ => Ok(PathBuf::from(path)),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.doctrail/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DoctrailError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.doctrail/doctrail.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DoctrailError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        DoctrailError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject configs the engine cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.defaults.doc_type.trim().is_empty() {
        return Err(DoctrailError::config("defaults.doc_type must not be empty"));
    }
    url::Url::parse(&config.git.provider_url).map_err(|e| {
        DoctrailError::config(format!(
            "git.provider_url '{}' is not a valid URL: {e}",
            config.git.provider_url
        ))
    })?;
    if config.git.clone_depth == Some(0) {
        return Err(DoctrailError::config(
            "git.clone_depth must be at least 1 (omit it for a full clone)",
        ));
    }
    config.tracked()?;
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DoctrailError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DoctrailError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DoctrailError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
