//! Health and service info handlers.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ApiInfo {
    pub name: String,
    pub version: String,
    pub supported_analyses: BTreeMap<&'static str, &'static str>,
    pub supported_formats: Vec<String>,
}

/// Service description with the analysis kinds this deployment can run.
pub async fn root(State(state): State<AppState>) -> Json<ApiInfo> {
    Json(ApiInfo {
        name: "vidmeta".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        supported_analyses: state.orchestrator.analysis_descriptions(),
        supported_formats: state.orchestrator.supported_formats().to_vec(),
    })
}
