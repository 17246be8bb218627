//! Sequential composition of stages.

use std::time::Instant;

use tracing::{debug, warn};

use doctrail_shared::Result;

use crate::context::{ResultContext, StageId};
use crate::engine::ProgressReporter;
use crate::stages::{RunEnv, Stage};

/// Fold `stages` over `ctx` in order, stopping at the first error.
///
/// `on_stage` is called before each stage starts. The error of a failing
/// stage is returned as-is.
pub async fn run_stages(
    stages: &[Box<dyn Stage>],
    mut ctx: ResultContext,
    env: &RunEnv,
    progress: &dyn ProgressReporter,
    on_stage: impl Fn(StageId) + Send + Sync,
) -> Result<ResultContext> {
    let total = stages.len();

    for (index, stage) in stages.iter().enumerate() {
        let id = stage.id();
        on_stage(id);
        progress.stage_started(id, index + 1, total);

        let started = Instant::now();
        ctx = stage
            .run(ctx, env)
            .await
            .inspect_err(|e| warn!(stage = ?id, error = %e, "stage failed"))?;

        let elapsed = started.elapsed();
        debug!(stage = ?id, elapsed_ms = elapsed.as_millis(), "stage finished");
        progress.stage_finished(id, elapsed);
    }

    Ok(ctx)
}
