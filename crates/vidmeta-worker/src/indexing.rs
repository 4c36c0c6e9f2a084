//! Multimodal indexing workflow.
//!
//! Drives one video through the remote indexing service:
//!
//! 1. Reuse a prior upload of the same file when one is already indexed
//! 2. Validate the local file
//! 3. Verify or create the target index
//! 4. Upload with retry (exponential backoff, fixed cooldown on rate limits)
//! 5. Poll the indexing task with a growing interval until it is terminal
//! 6. Generate the structured description
//!
//! Every observed indexing state is written to the job store so callers
//! can follow progress there. A write that finds the job gone means the
//! job was cancelled and the workflow stops.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vidmeta_indexer::{
    extract_generated_text, IndexCapabilities, IndexingService, TaskState, ANALYSIS_PROMPT,
};
use vidmeta_models::{AnalysisKind, IndexingStatus, IndexingUpdate, Job, JobId};
use vidmeta_store::JobStore;

use crate::analyzer::Analyzer;
use crate::config::IndexingConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_async, FailureTracker, RetryConfig, RetryDecision};

/// Payload stored for the `multimodal` analysis kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultimodalOutput {
    pub video_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub summary: String,
    pub reused_existing_upload: bool,
}

/// A video known to be indexed and ready for generation.
#[derive(Debug, Clone, PartialEq)]
struct IndexedVideo {
    video_id: String,
    index_id: Option<String>,
    task_id: Option<String>,
    reused: bool,
}

/// Remote indexing driver.
#[derive(Clone)]
pub struct IndexingWorkflow {
    service: Arc<dyn IndexingService>,
    jobs: Arc<dyn JobStore>,
    config: IndexingConfig,
}

impl IndexingWorkflow {
    pub fn new(
        service: Arc<dyn IndexingService>,
        jobs: Arc<dyn JobStore>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            service,
            jobs,
            config,
        }
    }

    /// Index the job's video (or reuse a prior upload) and describe it.
    pub async fn run(&self, job: &Job) -> WorkerResult<MultimodalOutput> {
        let logger = JobLogger::new(&job.id, "multimodal");
        logger.start(&job.filename);

        let indexed = match self.ensure_indexed(job, &logger).await {
            Ok(indexed) => indexed,
            Err(e) => {
                self.mark_failed(&job.id, &e).await;
                return Err(e);
            }
        };

        let summary = self.generate_summary(&indexed.video_id).await?;
        logger.finish(&format!(
            "video {} described ({} chars)",
            indexed.video_id,
            summary.len()
        ));

        Ok(MultimodalOutput {
            video_id: indexed.video_id,
            index_id: indexed.index_id,
            task_id: indexed.task_id,
            summary,
            reused_existing_upload: indexed.reused,
        })
    }

    async fn ensure_indexed(&self, job: &Job, logger: &JobLogger) -> WorkerResult<IndexedVideo> {
        if let Some(prior) = self.find_reusable(job).await? {
            if let Some(video_id) = prior.video_id.clone() {
                logger.step(&format!(
                    "reusing video {} indexed by job {}",
                    video_id, prior.id
                ));
                let mut update = IndexingUpdate::status(IndexingStatus::Ready)
                    .with_video_id(&video_id)
                    .with_progress(1.0);
                if let Some(index_id) = &prior.index_id {
                    update = update.with_index_id(index_id);
                }
                if let Some(task_id) = &prior.task_id {
                    update = update.with_task_id(task_id);
                }
                self.record(&job.id, &update).await?;
                metrics::record_indexing_reused();

                return Ok(IndexedVideo {
                    video_id,
                    index_id: prior.index_id,
                    task_id: prior.task_id,
                    reused: true,
                });
            }
        }

        let path = Path::new(&job.video_path);
        let size = self.validate_file(path).await?;

        let (index_id, created) = self.acquire_index().await?;
        logger.step(&format!(
            "uploading {} bytes into index {}{}",
            size,
            index_id,
            if created { " (created)" } else { "" }
        ));
        self.record(
            &job.id,
            &IndexingUpdate::status(IndexingStatus::Uploading)
                .with_index_id(&index_id)
                .with_progress(0.0),
        )
        .await?;

        let task_id = self.upload(&index_id, path).await?;
        self.record(
            &job.id,
            &IndexingUpdate::status(IndexingStatus::Pending).with_task_id(&task_id),
        )
        .await?;
        logger.step(&format!("upload accepted as task {}", task_id));

        let video_id = self.wait_for_ready(&job.id, &task_id).await?;
        Ok(IndexedVideo {
            video_id,
            index_id: Some(index_id),
            task_id: Some(task_id),
            reused: false,
        })
    }

    /// A prior job for the same file whose external video is ready.
    pub async fn find_reusable(&self, job: &Job) -> WorkerResult<Option<Job>> {
        match self.jobs.find_by_filename(&job.filename).await {
            Ok(prior) if prior.id != job.id && prior.has_ready_video() => Ok(Some(prior)),
            Ok(_) => Ok(None),
            Err(e) => {
                let e = WorkerError::from(e);
                if e.is_not_found() {
                    Ok(None)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Check the file before any network call. Returns its size.
    pub async fn validate_file(&self, path: &Path) -> WorkerResult<u64> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkerError::validation(format!(
                    "Video file not found: {}",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        if !metadata.is_file() {
            return Err(WorkerError::validation(format!(
                "Not a regular file: {}",
                path.display()
            )));
        }
        let size = metadata.len();
        if size == 0 {
            return Err(WorkerError::validation(format!(
                "Video file is empty: {}",
                path.display()
            )));
        }
        if size > self.config.max_file_bytes {
            return Err(WorkerError::validation(format!(
                "Video file is {} bytes, above the {} byte limit",
                size, self.config.max_file_bytes
            )));
        }
        Ok(size)
    }

    /// Verify the configured index or create one. Returns `(index_id, created)`.
    pub async fn acquire_index(&self) -> WorkerResult<(String, bool)> {
        if let Some(index_id) = &self.config.index_id {
            return match self.service.get_index(index_id).await.map_err(WorkerError::from) {
                Ok(info) => Ok((info.id, false)),
                Err(e) if e.is_not_found() => Err(WorkerError::config_error(format!(
                    "Configured index {} does not exist",
                    index_id
                ))),
                Err(e) => Err(e),
            };
        }

        let info = self
            .service
            .create_index(&self.config.index_name, &IndexCapabilities::standard())
            .await?;
        info!(index_id = %info.id, name = %self.config.index_name, "Created index");
        Ok((info.id, true))
    }

    /// Upload with retry. Returns the indexing task id.
    pub async fn upload(&self, index_id: &str, path: &Path) -> WorkerResult<String> {
        let retry = RetryConfig::new("indexing upload")
            .with_max_attempts(self.config.upload_max_attempts)
            .with_base_delay(self.config.upload_base_delay)
            .with_rate_limit_cooldown(self.config.rate_limit_cooldown);

        let result = retry_async(&retry, RetryDecision::for_worker_error, || async move {
            self.service
                .upload_video(index_id, path)
                .await
                .map_err(WorkerError::from)
        })
        .await;

        let retries = result.attempts().saturating_sub(1);
        if retries > 0 {
            metrics::record_upload_retries(u64::from(retries));
        }
        match result.into_result() {
            Ok(task_id) => Ok(task_id),
            Err(e) => {
                warn!(attempts = retries + 1, "Upload failed: {}", e);
                Err(e)
            }
        }
    }

    /// Poll the task until it is ready, failed, or the timeout elapses.
    ///
    /// Returns the external video id.
    pub async fn wait_for_ready(&self, job_id: &JobId, task_id: &str) -> WorkerResult<String> {
        let started = Instant::now();
        let timeout = self.config.indexing_timeout;
        let mut interval = self.config.poll_interval;
        let mut failures = FailureTracker::new(3);
        let mut last_seen: Option<(IndexingStatus, Option<f64>)> = None;

        loop {
            // Abandon as soon as the job has been cancelled.
            if let Err(e) = self.jobs.get(job_id).await {
                let e = WorkerError::from(e);
                return Err(if e.is_not_found() {
                    WorkerError::Cancelled(job_id.to_string())
                } else {
                    e
                });
            }

            metrics::record_indexing_poll();
            match self.service.get_task(task_id).await.map_err(WorkerError::from) {
                Ok(task) => {
                    failures.record_success();
                    let status = indexing_status_for(&task.state);
                    let progress = match task.state {
                        TaskState::Ready => Some(1.0),
                        _ => task.progress,
                    };

                    if last_seen != Some((status, progress)) {
                        debug!(task_id, status = %status, ?progress, "Indexing status changed");
                        let mut update = IndexingUpdate::status(status);
                        if let Some(progress) = progress {
                            update = update.with_progress(progress);
                        }
                        // A video id is only usable once indexing finished.
                        if let (TaskState::Ready, Some(video_id)) = (&task.state, &task.video_id) {
                            update = update.with_video_id(video_id);
                        }
                        self.record(job_id, &update).await?;
                        last_seen = Some((status, progress));
                    }

                    match task.state {
                        TaskState::Ready => {
                            return task.video_id.ok_or_else(|| {
                                WorkerError::IndexingFailed(format!(
                                    "task {} is ready but has no video id",
                                    task_id
                                ))
                            })
                        }
                        TaskState::Failed => {
                            return Err(WorkerError::IndexingFailed(
                                task.error
                                    .unwrap_or_else(|| format!("task {} failed", task_id)),
                            ))
                        }
                        _ => {}
                    }
                }
                Err(e) if e.is_retryable() || e.is_rate_limit() => {
                    if failures.record_failure() {
                        warn!(task_id, "Indexing status poll failed: {}", e);
                    }
                }
                Err(e) => return Err(e),
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(WorkerError::IndexingTimeout(timeout.as_secs()));
            }
            tokio::time::sleep(interval.min(timeout - elapsed)).await;
            interval = next_poll_interval(interval, self.config.max_poll_interval);
        }
    }

    /// Ask the service for the structured description of an indexed video.
    pub async fn generate_summary(&self, video_id: &str) -> WorkerResult<String> {
        let response = self.service.generate_text(video_id, ANALYSIS_PROMPT).await?;
        Ok(extract_generated_text(&response).unwrap_or_else(|| {
            warn!(video_id, "No text field in generation response, keeping raw body");
            response.to_string()
        }))
    }

    /// Persist indexing metadata; a missing job means it was cancelled.
    async fn record(&self, job_id: &JobId, update: &IndexingUpdate) -> WorkerResult<()> {
        match self.jobs.update_indexing(job_id, update).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Err(WorkerError::Cancelled(job_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn mark_failed(&self, job_id: &JobId, cause: &WorkerError) {
        if cause.is_cancelled() {
            return;
        }
        if let Err(e) = self
            .jobs
            .update_indexing(job_id, &IndexingUpdate::status(IndexingStatus::Failed))
            .await
        {
            debug!(job_id = %job_id, "Could not mark indexing failed: {}", e);
        }
    }
}

/// Job-store view of a remote task state.
fn indexing_status_for(state: &TaskState) -> IndexingStatus {
    match state {
        TaskState::Pending => IndexingStatus::Pending,
        TaskState::Validating => IndexingStatus::Validating,
        TaskState::Indexing | TaskState::Other(_) => IndexingStatus::Running,
        TaskState::Ready => IndexingStatus::Ready,
        TaskState::Failed => IndexingStatus::Failed,
    }
}

/// Grow the polling interval by half, up to `max`.
pub fn next_poll_interval(current: Duration, max: Duration) -> Duration {
    current.mul_f64(1.5).min(max)
}

#[async_trait]
impl Analyzer for IndexingWorkflow {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Multimodal
    }

    async fn analyze(&self, job: &Job, _work_dir: &Path) -> WorkerResult<serde_json::Value> {
        let output = self.run(job).await?;
        Ok(serde_json::to_value(output)?)
    }
}
