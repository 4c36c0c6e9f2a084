//! Job records, lifecycle status and indexing metadata.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AnalysisKind;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failed to parse a stored enum value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Job lifecycle status.
///
/// `Processing` is the only non-terminal state; jobs leave it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ParseEnumError::new("job status", other)),
        }
    }
}

/// Status of the external indexing task attached to a job.
///
/// Progression: `uploading -> pending -> validating|running -> ready|failed`.
/// This axis never moves the parent [`JobStatus`] on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
    Uploading,
    Pending,
    Validating,
    Running,
    Ready,
    Failed,
}

impl IndexingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexingStatus::Uploading => "uploading",
            IndexingStatus::Pending => "pending",
            IndexingStatus::Validating => "validating",
            IndexingStatus::Running => "running",
            IndexingStatus::Ready => "ready",
            IndexingStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IndexingStatus::Ready | IndexingStatus::Failed)
    }

    /// Work is underway on the remote side (or on its way there).
    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for IndexingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(IndexingStatus::Uploading),
            "pending" => Ok(IndexingStatus::Pending),
            "validating" => Ok(IndexingStatus::Validating),
            "running" => Ok(IndexingStatus::Running),
            "ready" => Ok(IndexingStatus::Ready),
            "failed" => Ok(IndexingStatus::Failed),
            other => Err(ParseEnumError::new("indexing status", other)),
        }
    }
}

/// A video analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Original upload filename, used for indexing de-duplication
    pub filename: String,

    /// Where the uploaded video was saved
    pub video_path: String,

    /// Per-job scratch directory, removed on cleanup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_size: Option<u64>,

    /// Requested analysis kinds (never empty)
    pub analysis_types: Vec<AnalysisKind>,

    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_end_time: Option<DateTime<Utc>>,

    // Indexing metadata, only populated while a multimodal analysis runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexing_status: Option<IndexingStatus>,

    /// Indexing progress, 0.0 to 1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexing_progress: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexing_start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexing_end_time: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new job in the `processing` state.
    pub fn new(
        id: JobId,
        filename: impl Into<String>,
        video_path: impl Into<String>,
        analysis_types: Vec<AnalysisKind>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            filename: filename.into(),
            video_path: video_path.into(),
            temp_dir: None,
            content_type: None,
            video_size: None,
            analysis_types,
            status: JobStatus::Processing,
            error: None,
            created_at: now,
            updated_at: now,
            processing_start_time: Some(now),
            processing_end_time: None,
            video_id: None,
            index_id: None,
            task_id: None,
            indexing_status: None,
            indexing_progress: None,
            indexing_start_time: None,
            indexing_end_time: None,
        }
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<String>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_video_size(mut self, size: u64) -> Self {
        self.video_size = Some(size);
        self
    }

    /// Set the lifecycle status, stamping the end time on terminal states.
    pub fn set_status(&mut self, status: JobStatus, error: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        if error.is_some() {
            self.error = error;
        }
        if status.is_terminal() {
            self.processing_end_time = Some(now);
        }
        self.updated_at = now;
    }

    /// Apply a partial indexing update with the usual timestamp rules.
    pub fn apply_indexing(&mut self, update: &IndexingUpdate, now: DateTime<Utc>) {
        if let Some(video_id) = &update.video_id {
            self.video_id = Some(video_id.clone());
        }
        if let Some(index_id) = &update.index_id {
            self.index_id = Some(index_id.clone());
        }
        if let Some(task_id) = &update.task_id {
            self.task_id = Some(task_id.clone());
        }
        if let Some(progress) = update.progress {
            self.indexing_progress = Some(progress.clamp(0.0, 1.0));
        }
        if let Some(status) = update.status {
            self.indexing_status = Some(status);
            if status.is_in_flight() && self.indexing_start_time.is_none() {
                self.indexing_start_time = Some(now);
            }
            if status.is_terminal() {
                self.indexing_end_time = Some(now);
            }
        }
        self.updated_at = now;
    }

    /// True once the job carries a usable external video id.
    pub fn has_ready_video(&self) -> bool {
        self.video_id.is_some() && self.indexing_status == Some(IndexingStatus::Ready)
    }
}

/// Partial update of a job's indexing metadata. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexingUpdate {
    pub video_id: Option<String>,
    pub index_id: Option<String>,
    pub task_id: Option<String>,
    pub status: Option<IndexingStatus>,
    pub progress: Option<f64>,
}

impl IndexingUpdate {
    pub fn status(status: IndexingStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_video_id(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    pub fn with_index_id(mut self, index_id: impl Into<String>) -> Self {
        self.index_id = Some(index_id.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
