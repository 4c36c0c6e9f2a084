//! Per-job log context.
//!
//! Background work for one job logs through a [`JobLogger`], so every line
//! carries the job id and the stage that wrote it. Completion and failure
//! lines also report how long the stage ran.

use std::time::{Duration, Instant};

use tracing::{error, info, warn, Span};
use vidmeta_models::JobId;

#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    /// `orchestrate`, `structured` or `multimodal`
    stage: &'static str,
    started: Instant,
}

impl JobLogger {
    pub fn new(job_id: &JobId, stage: &'static str) -> Self {
        Self {
            job_id: job_id.clone(),
            stage,
            started: Instant::now(),
        }
    }

    /// The stage begins work on `subject` (usually the file name).
    pub fn start(&self, subject: &str) {
        info!(job_id = %self.job_id, stage = self.stage, "{} started: {}", self.stage, subject);
    }

    pub fn step(&self, message: &str) {
        info!(job_id = %self.job_id, stage = self.stage, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(job_id = %self.job_id, stage = self.stage, "{}", message);
    }

    pub fn fail(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            stage = self.stage,
            elapsed_ms = self.elapsed_ms(),
            "{} failed: {}", self.stage, message
        );
    }

    pub fn finish(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            stage = self.stage,
            elapsed_ms = self.elapsed_ms(),
            "{} finished: {}", self.stage, message
        );
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Time since the logger was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Span for instrumenting the job's background task.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, stage = self.stage)
    }
}
