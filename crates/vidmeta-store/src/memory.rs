//! In-memory stores for tests.
//!
//! Mirrors the Redis semantics (existence guards, terminal-status guard,
//! timestamp stamping) so higher crates can exercise their flows without a
//! Redis server.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use vidmeta_models::{AnalysisKind, AnalysisResult, IndexingUpdate, Job, JobId, JobStatus};

use crate::error::{StoreError, StoreResult};
use crate::traits::{JobStore, ResultsStore};

#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    results: RwLock<HashMap<JobId, Vec<AnalysisResult>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, job: &Job) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::already_exists(job.id.as_str()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> StoreResult<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id.as_str()))
    }

    async fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        if job.status.is_terminal() {
            return Err(StoreError::AlreadyTerminal {
                job_id: id.to_string(),
                status: job.status,
            });
        }
        job.set_status(status, error.map(str::to_string), Utc::now());
        Ok(())
    }

    async fn update_indexing(&self, id: &JobId, update: &IndexingUpdate) -> StoreResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        job.apply_indexing(update, Utc::now());
        Ok(())
    }

    async fn find_by_filename(&self, filename: &str) -> StoreResult<Job> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.filename == filename && job.has_ready_video())
            .max_by_key(|job| job.updated_at)
            .cloned()
            .ok_or_else(|| StoreError::not_found(filename))
    }

    async fn delete(&self, id: &JobId) -> StoreResult<bool> {
        Ok(self.jobs.write().await.remove(id).is_some())
    }
}

#[async_trait]
impl ResultsStore for MemoryStore {
    async fn store(
        &self,
        job_id: &JobId,
        kind: AnalysisKind,
        payload: serde_json::Value,
        processing_time: f64,
    ) -> StoreResult<AnalysisResult> {
        // Hold the jobs lock so a concurrent delete cannot interleave.
        let jobs = self.jobs.read().await;
        if !jobs.contains_key(job_id) {
            return Err(StoreError::not_found(job_id.as_str()));
        }
        let result = AnalysisResult::new(job_id.clone(), kind, payload, processing_time);
        self.results
            .write()
            .await
            .entry(job_id.clone())
            .or_default()
            .push(result.clone());
        Ok(result)
    }

    async fn get_all(&self, job_id: &JobId) -> StoreResult<Vec<AnalysisResult>> {
        Ok(self
            .results
            .read()
            .await
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_all(&self, job_id: &JobId) -> StoreResult<u64> {
        Ok(self
            .results
            .write()
            .await
            .remove(job_id)
            .map(|r| r.len() as u64)
            .unwrap_or(0))
    }
}
