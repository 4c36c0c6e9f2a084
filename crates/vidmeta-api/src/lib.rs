//! Axum HTTP API server.
//!
//! This crate provides:
//! - Video upload and analysis job submission
//! - Job status polling and deletion
//! - Service discovery and health endpoints
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
