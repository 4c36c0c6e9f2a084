//! Per-kind analysis contract used by the orchestrator.

use std::path::Path;

use async_trait::async_trait;
use vidmeta_models::{AnalysisKind, Job};

use crate::error::WorkerResult;

/// One analysis kind's implementation.
///
/// Implementations produce the JSON payload stored in the results store.
/// Errors are isolated to this kind; the orchestrator keeps running the
/// job's other kinds.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn kind(&self) -> AnalysisKind;

    /// Analyze the job's video. `work_dir` is a scratch directory owned by
    /// the job and removed with it.
    async fn analyze(&self, job: &Job, work_dir: &Path) -> WorkerResult<serde_json::Value>;
}
