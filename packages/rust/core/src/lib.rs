//! Documentation-change pipeline for doctrail.
//!
//! An [`Engine`] mirrors a remote, snapshots its documents, diffs the capture
//! against the previous one, and refreshes the generated posts. Each run
//! threads a [`ResultContext`] through six [`Stage`]s and returns it with one
//! ledger entry per stage.

pub mod context;
pub mod engine;
pub mod runner;
pub mod stages;

pub use context::{ResultContext, StageId, StepKey, StepPayload, StepResult};
pub use engine::{Engine, EngineStatus, ProgressReporter, SilentProgress};
pub use stages::{RunEnv, Stage, register_stages};
