//! Indexing service contract.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::IndexerResult;
use crate::types::{IndexCapabilities, IndexInfo, TaskStatus};

/// Prompt sent when generating the description of an indexed video.
pub const ANALYSIS_PROMPT: &str = "Analyze this short-form video and provide a comprehensive description. \
Describe the video's purpose, main topics and target audience, explaining what it communicates and its context. \
Detail the visual elements, including the setting, objects, products and notable effects or transitions. \
Summarize the spoken content, highlighting key phrases, quotes and points the presenter emphasizes. \
Explain the narrative flow from the opening through the main segments to the conclusion. \
Identify any calls to action, such as asking viewers to like, comment, follow or click links. \
Analyze the presenter's persona, including tone, style, personality and engagement with the audience. \
Output the results as a single JSON object with the keys \"content_overview\", \"key_visual_elements\", \
\"spoken_content_and_dialogues\", \"narrative_flow\", \"calls_to_action\" and \"presenter_persona\". \
Ensure the JSON is valid, contains no formatting or newline characters, and includes as much detail as possible for each field.";

/// Remote multimodal indexing service.
#[async_trait]
pub trait IndexingService: Send + Sync {
    /// Look up an existing index.
    async fn get_index(&self, index_id: &str) -> IndexerResult<IndexInfo>;

    async fn create_index(
        &self,
        name: &str,
        capabilities: &IndexCapabilities,
    ) -> IndexerResult<IndexInfo>;

    /// Upload a local video into an index. Returns the indexing task id.
    async fn upload_video(&self, index_id: &str, path: &Path) -> IndexerResult<String>;

    async fn get_task(&self, task_id: &str) -> IndexerResult<TaskStatus>;

    /// Open-ended text generation over an indexed video. Returns the raw response body.
    async fn generate_text(&self, video_id: &str, prompt: &str) -> IndexerResult<Value>;
}

const TEXT_FIELDS: [&str; 5] = ["data", "summary", "text", "result", "content"];
const MAX_DEPTH: usize = 4;

/// Pull the generated text out of a generation response.
///
/// The service has returned the text under different keys across API
/// versions, sometimes nested one level down, so every known key is tried.
pub fn extract_generated_text(value: &Value) -> Option<String> {
    extract_at_depth(value, 0)
}

fn extract_at_depth(value: &Value, depth: usize) -> Option<String> {
    if depth > MAX_DEPTH {
        return None;
    }
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Object(map) => TEXT_FIELDS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|inner| extract_at_depth(inner, depth + 1)),
        Value::Array(items) => items
            .iter()
            .find_map(|inner| extract_at_depth(inner, depth + 1)),
        _ => None,
    }
}
