//! Store contracts.

use async_trait::async_trait;
use vidmeta_models::{AnalysisKind, AnalysisResult, IndexingUpdate, Job, JobId, JobStatus};

use crate::error::StoreResult;

/// Durable record of jobs.
///
/// Every mutation is a field-level update that stamps `updated_at`. Updates
/// against a missing job fail with `NotFound` and never recreate it, so a
/// background task that outlives a cancellation cannot resurrect the job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, job: &Job) -> StoreResult<()>;

    async fn get(&self, id: &JobId) -> StoreResult<Job>;

    /// Move the job to `status`. Terminal statuses stamp `processing_end_time`
    /// and a job that is already terminal refuses further transitions.
    async fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
    ) -> StoreResult<()>;

    /// Merge the `Some` fields of `update` into the job's indexing metadata.
    ///
    /// `indexing_start_time` is set the first time an in-flight status is
    /// written; `indexing_end_time` on every terminal one.
    async fn update_indexing(&self, id: &JobId, update: &IndexingUpdate) -> StoreResult<()>;

    /// Latest job for `filename` whose external video finished indexing.
    ///
    /// Jobs still indexing, or whose indexing failed, are never returned.
    async fn find_by_filename(&self, filename: &str) -> StoreResult<Job>;

    /// Remove the job. Returns whether it existed.
    async fn delete(&self, id: &JobId) -> StoreResult<bool>;
}

/// Durable record of per-kind analysis output.
#[async_trait]
pub trait ResultsStore: Send + Sync {
    /// Append a result for `job_id`. Fails with `NotFound` once the job is gone.
    async fn store(
        &self,
        job_id: &JobId,
        kind: AnalysisKind,
        payload: serde_json::Value,
        processing_time: f64,
    ) -> StoreResult<AnalysisResult>;

    /// All results for the job in insertion order. Empty when none exist.
    async fn get_all(&self, job_id: &JobId) -> StoreResult<Vec<AnalysisResult>>;

    /// Remove every result for the job. Returns how many were removed.
    async fn delete_all(&self, job_id: &JobId) -> StoreResult<u64>;
}
