//! Shared types, error model, configuration, and on-disk layout for doctrail.
//!
//! This crate is the foundation depended on by all other doctrail crates.
//! It provides:
//! - [`DoctrailError`] — the unified error type
//! - Domain types ([`Remote`], [`ProcessParams`], [`Snapshot`], [`SnapshotDiff`])
//! - Configuration ([`AppConfig`], config loading)
//! - [`EngineLayout`] — every path under the base directory

pub mod config;
pub mod error;
pub mod fsutil;
pub mod layout;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, GitConfig, RemoteEntry, config_dir, config_file_path, expand_home,
    init_config, load_config, load_config_from, validate_config,
};
pub use error::{DoctrailError, Result};
pub use layout::{EngineLayout, snapshot_file};
pub use types::{
    CURRENT_SCHEMA_VERSION, DocumentMeta, DocumentNode, ProcessParams, Remote, RunId, Snapshot,
    SnapshotDiff, SnapshotRef,
};
