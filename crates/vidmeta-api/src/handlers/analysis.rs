//! Analysis job handlers.

use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;
use vidmeta_models::JobId;
use vidmeta_worker::{JobStatusView, SubmitRequest};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub job_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

/// Fields collected from the multipart form.
#[derive(Debug, Default)]
struct AnalyzeForm {
    video: Option<SavedVideo>,
    analyses: Vec<String>,
    job_id: Option<String>,
}

#[derive(Debug)]
struct SavedVideo {
    path: PathBuf,
    filename: String,
    content_type: Option<String>,
    size: u64,
}

/// Start an analysis job from an uploaded video.
///
/// Form fields: `video` (file), `analyses` (comma list, may repeat), `job_id` (optional).
pub async fn start_analysis(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<AnalyzeResponse>> {
    let upload_dir = state.config.upload_dir.join(Uuid::new_v4().to_string());

    let form = match read_form(multipart, &upload_dir).await {
        Ok(form) => form,
        Err(e) => {
            discard_upload(&upload_dir).await;
            return Err(e);
        }
    };

    let Some(video) = form.video else {
        discard_upload(&upload_dir).await;
        return Err(ApiError::bad_request("No video file provided"));
    };
    let size = video.size;

    let request = SubmitRequest {
        job_id: form.job_id,
        video_path: video.path,
        filename: video.filename,
        content_type: video.content_type,
        size: Some(size),
        temp_dir: Some(upload_dir.clone()),
        analyses: form.analyses,
    };

    let job_id = match state.orchestrator.submit(request).await {
        Ok(job_id) => job_id,
        Err(e) => {
            discard_upload(&upload_dir).await;
            return Err(e.into());
        }
    };

    metrics::record_upload_bytes(size);
    info!(job_id = %job_id, bytes = size, "Analysis job accepted");

    Ok(Json(AnalyzeResponse {
        job_id: job_id.to_string(),
        status: "processing".to_string(),
        message: "Analysis started. Poll the job for results.".to_string(),
    }))
}

/// Get a job's status and any stored results.
pub async fn get_analysis_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusView>> {
    let view = state
        .orchestrator
        .get_status(&JobId::from_string(job_id))
        .await?;
    Ok(Json(view))
}

/// Delete a job with its results and files.
pub async fn delete_analysis(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let job_id = JobId::from_string(job_id);
    state.orchestrator.cancel(&job_id).await?;
    Ok(Json(DeleteResponse {
        message: format!("Job {} deleted", job_id),
    }))
}

async fn read_form(mut multipart: Multipart, upload_dir: &FsPath) -> ApiResult<AnalyzeForm> {
    let mut form = AnalyzeForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => {
                if form.video.is_some() {
                    return Err(ApiError::bad_request("Only one video file is accepted"));
                }
                let filename = safe_filename(field.file_name().unwrap_or_default());
                let content_type = field.content_type().map(str::to_string);

                tokio::fs::create_dir_all(upload_dir).await?;
                let path = upload_dir.join(&filename);
                let mut file = tokio::fs::File::create(&path).await?;
                let mut size = 0u64;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Upload interrupted: {}", e)))?
                {
                    file.write_all(&chunk).await?;
                    size += chunk.len() as u64;
                }
                file.flush().await?;

                form.video = Some(SavedVideo {
                    path,
                    filename,
                    content_type,
                    size,
                });
            }
            "analyses" => form.analyses.push(text(field).await?),
            "job_id" => {
                let id = text(field).await?;
                form.job_id = Some(id).filter(|id| !id.trim().is_empty());
            }
            other => warn!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

async fn text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid form field: {}", e)))
}

/// Keep only the final path component of a client-supplied file name.
fn safe_filename(raw: &str) -> String {
    FsPath::new(raw)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty() && name != "..")
        .unwrap_or_else(|| "upload".to_string())
}

async fn discard_upload(dir: &FsPath) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %dir.display(), "Failed to remove rejected upload: {}", e);
        }
    }
}
