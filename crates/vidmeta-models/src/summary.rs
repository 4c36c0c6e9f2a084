//! Structured summary produced from matched scenes.

use serde::{Deserialize, Serialize};

/// A notable moment in the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// `HH:MM:SS` timecode
    pub timestamp: String,
    pub text: String,
}

/// Summary returned by the summarization collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredSummary {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub keypoints: Vec<Keypoint>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<String>,
}

/// JSON schema the summarizer's output must follow.
pub fn summary_json_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "summary": { "type": "STRING" },
            "keypoints": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "timestamp": { "type": "STRING" },
                        "text": { "type": "STRING" }
                    },
                    "required": ["timestamp", "text"]
                }
            },
            "topics": { "type": "ARRAY", "items": { "type": "STRING" } },
            "content_type": { "type": "STRING" },
            "call_to_action": { "type": "STRING" }
        },
        "required": ["title", "summary", "keypoints", "topics", "content_type"]
    })
}
