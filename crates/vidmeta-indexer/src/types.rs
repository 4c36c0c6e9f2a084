//! Wire types for the indexing service.

use serde::{Deserialize, Serialize};

/// A model enabled on an index and the modalities it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexModel {
    pub model_name: String,
    pub model_options: Vec<String>,
}

impl IndexModel {
    pub fn new(model_name: impl Into<String>, options: &[&str]) -> Self {
        Self {
            model_name: model_name.into(),
            model_options: options.iter().map(|o| o.to_string()).collect(),
        }
    }
}

/// Capabilities requested when an index is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexCapabilities {
    pub models: Vec<IndexModel>,
    #[serde(default)]
    pub addons: Vec<String>,
}

impl IndexCapabilities {
    /// Visual, conversation, on-screen text and logo search, plus
    /// generation over visual and conversation, with thumbnails.
    pub fn standard() -> Self {
        Self {
            models: vec![
                IndexModel::new("marengo2.7", &["visual", "conversation", "text_in_video", "logo"]),
                IndexModel::new("pegasus1.2", &["visual", "conversation"]),
            ],
            addons: vec!["thumbnail".to_string()],
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateIndexRequest<'a> {
    pub index_name: &'a str,
    pub models: &'a [IndexModel],
    pub addons: &'a [String],
}

/// An index as returned by the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexInfo {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub index_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedTask {
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskProcess {
    #[serde(default)]
    pub percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub process: Option<TaskProcess>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateRequest<'a> {
    pub video_id: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
}

/// Remote state of an indexing task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Validating,
    Indexing,
    Ready,
    Failed,
    /// A state this client does not know yet; treated as still in progress.
    Other(String),
}

impl TaskState {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "pending" | "queued" => TaskState::Pending,
            "validating" => TaskState::Validating,
            "indexing" => TaskState::Indexing,
            "ready" => TaskState::Ready,
            "failed" => TaskState::Failed,
            other => TaskState::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Ready | TaskState::Failed)
    }
}

/// Snapshot of an indexing task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    pub task_id: String,
    pub state: TaskState,
    /// Set once the task is ready
    pub video_id: Option<String>,
    /// 0.0 to 1.0 when the service reports it
    pub progress: Option<f64>,
    /// Remote failure reason
    pub error: Option<String>,
}

impl From<TaskResponse> for TaskStatus {
    fn from(task: TaskResponse) -> Self {
        let error = task.error.map(|e| match e.get("message").and_then(|m| m.as_str()) {
            Some(message) => message.to_string(),
            None => e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()),
        });

        Self {
            task_id: task.id,
            state: TaskState::parse(&task.status),
            video_id: task.video_id.filter(|v| !v.is_empty()),
            progress: task
                .process
                .and_then(|p| p.percentage)
                .map(|pct| (pct / 100.0).clamp(0.0, 1.0)),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_profile() {
        let caps = IndexCapabilities::standard();
        assert_eq!(caps.models.len(), 2);
        assert!(caps.models[0]
            .model_options
            .iter()
            .any(|o| o == "text_in_video"));
        assert_eq!(caps.addons, vec!["thumbnail"]);
    }

    #[test]
    fn test_task_response_conversion() {
        let task: TaskResponse = serde_json::from_value(serde_json::json!({
            "_id": "task-1",
            "status": "indexing",
            "video_id": "",
            "process": {"percentage": 42.0}
        }))
        .unwrap();
        let status = TaskStatus::from(task);
        assert_eq!(status.state, TaskState::Indexing);
        assert_eq!(status.video_id, None);
        assert!((status.progress.unwrap() - 0.42).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_state_is_not_terminal() {
        let state = TaskState::parse("transcoding");
        assert_eq!(state, TaskState::Other("transcoding".into()));
        assert!(!state.is_terminal());
        assert!(TaskState::parse("READY").is_terminal());
    }

    #[test]
    fn test_error_message_from_object() {
        let task: TaskResponse = serde_json::from_value(serde_json::json!({
            "_id": "t",
            "status": "failed",
            "error": {"code": "video_too_short", "message": "Video is too short"}
        }))
        .unwrap();
        assert_eq!(TaskStatus::from(task).error.as_deref(), Some("Video is too short"));
    }
}
