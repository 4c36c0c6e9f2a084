//! Bounded worker pool for heavy inference work.
//!
//! Transcription, OCR and captioning are long-running calls into external
//! models. They run as spawned tasks gated by a shared semaphore so the
//! coordinating task never does the work itself and the number of
//! concurrent branches stays fixed across all jobs.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};

/// Fixed-size pool of worker permits.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a running task.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `task` on a background task once a permit is free.
    ///
    /// The returned future is the join point; a panic inside the task is
    /// reported as an internal error.
    pub async fn run<F, T>(&self, name: &'static str, task: F) -> WorkerResult<T>
    where
        F: Future<Output = WorkerResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::internal("worker pool closed"))?;
            debug!(task = name, "Worker permit acquired");
            task.await
        });

        handle
            .await
            .map_err(|e| WorkerError::internal(format!("{} task failed: {}", name, e)))?
    }
}
