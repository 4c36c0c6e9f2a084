//! Worker error types.

use thiserror::Error;
use vidmeta_indexer::IndexerError;
use vidmeta_store::StoreError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        retry_after: Option<u64>,
        message: String,
    },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Indexing timed out after {0} seconds")]
    IndexingTimeout(u64),

    #[error("Indexing failed: {0}")]
    IndexingFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Job {0} was cancelled")]
    Cancelled(String),

    #[error("AI inference failed: {0}")]
    Inference(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Indexer error: {0}")]
    Indexer(IndexerError),

    #[error("Media error: {0}")]
    Media(#[from] vidmeta_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map a non-success HTTP status from an AI provider.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Authentication(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimited {
                retry_after: None,
                message,
            },
            500..=599 => Self::TransientNetwork(format!("HTTP {}: {}", status, message)),
            _ => Self::Inference(format!("HTTP {}: {}", status, message)),
        }
    }

    /// Transient failures worth another attempt with exponential backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::TransientNetwork(_) => true,
            WorkerError::Store(e) => e.is_retryable(),
            WorkerError::Indexer(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Rate-limit signals, retried after a fixed cooldown instead.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, WorkerError::RateLimited { .. })
    }

    /// The job disappeared underneath a background task.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, WorkerError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            WorkerError::NotFound(_) => true,
            WorkerError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<StoreError> for WorkerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => WorkerError::NotFound(format!("job {}", id)),
            other => WorkerError::Store(other),
        }
    }
}

impl From<IndexerError> for WorkerError {
    fn from(err: IndexerError) -> Self {
        match err {
            IndexerError::Authentication(msg) => WorkerError::Authentication(msg),
            IndexerError::NotFound(msg) => WorkerError::NotFound(msg),
            IndexerError::RateLimited {
                retry_after,
                message,
            } => WorkerError::RateLimited {
                retry_after,
                message,
            },
            e if e.is_retryable() => WorkerError::TransientNetwork(e.to_string()),
            other => WorkerError::Indexer(other),
        }
    }
}
