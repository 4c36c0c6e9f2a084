//! Indexing client error types.

use thiserror::Error;

pub type IndexerResult<T> = Result<T, IndexerError>;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        /// Seconds suggested by the `Retry-After` header, if any
        retry_after: Option<u64>,
        message: String,
    },

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Request failed ({0}): {1}")]
    RequestFailed(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexerError {
    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(
        status: u16,
        message: impl Into<String>,
        retry_after: Option<u64>,
    ) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Authentication(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimited {
                retry_after,
                message,
            },
            500..=599 => Self::ServerError(status, message),
            _ => Self::RequestFailed(status, message),
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Transient failures worth another attempt with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServerError(_, _) => true,
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Errors that no amount of retrying will fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status_mapping() {
        assert!(matches!(
            IndexerError::from_http_status(401, "bad key", None),
            IndexerError::Authentication(_)
        ));
        assert!(IndexerError::from_http_status(403, "forbidden", None).is_fatal());
        assert!(IndexerError::from_http_status(404, "no index", None).is_fatal());

        let limited = IndexerError::from_http_status(429, "slow down", Some(30));
        assert!(limited.is_rate_limited());
        assert!(!limited.is_retryable());
        assert!(matches!(
            limited,
            IndexerError::RateLimited {
                retry_after: Some(30),
                ..
            }
        ));

        assert!(IndexerError::from_http_status(503, "unavailable", None).is_retryable());
        let bad = IndexerError::from_http_status(400, "bad request", None);
        assert!(!bad.is_retryable());
        assert!(!bad.is_fatal());
    }
}
