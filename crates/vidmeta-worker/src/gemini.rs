//! Gemini client for frame captions and structured summaries.
//!
//! Frame captions send the key frame inline (base64) with a short prompt.
//! Summaries send the matched scenes as JSON and constrain the response
//! with a JSON schema. Each request walks the configured model list and
//! falls back to the next model on failure.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vidmeta_media::{FrameCaptioner, MediaError, MediaResult};
use vidmeta_models::{summary_json_schema, Scenes, StructuredSummary};

use crate::error::{WorkerError, WorkerResult};
use crate::structured::Summarizer;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const FALLBACK_MODELS: &[&str] = &["gemini-2.5-flash-lite", "gemini-2.5-pro"];

const CAPTION_PROMPT: &str =
    "Describe this video frame in one concise sentence. Mention the setting, people and notable objects.";

const SUMMARY_SYSTEM_PROMPT: &str = "You analyze scene-level video data and generate structured output \
for RAG-based systems to index and retrieve content accurately.";

const SUMMARY_PROMPT: &str = "Please analyze the following video scene data and provide a structured summary. \
Each scene carries its start timestamp, on-screen text, visual descriptions and the transcript spoken during it. \
Use scene timestamps for keypoints. Omit call_to_action when the video has none.\n\nSCENES:\n";

/// Gemini configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Preferred model
    pub model: String,
    /// Tried in order after the preferred model fails
    pub fallback_models: Vec<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            fallback_models: FALLBACK_MODELS.iter().map(|m| m.to_string()).collect(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl GeminiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            model: std::env::var("GEMINI_MODEL")
                .ok()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(defaults.model),
            ..defaults
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn models(&self) -> Vec<&str> {
        let mut models = vec![self.model.as_str()];
        for fallback in &self.fallback_models {
            if !models.contains(&fallback.as_str()) {
                models.push(fallback);
            }
        }
        models
    }
}

/// Gemini API request.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    #[serde(rename = "responseSchema", skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
    temperature: f32,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> WorkerResult<Self> {
        if !config.is_configured() {
            return Err(WorkerError::config_error("GEMINI_API_KEY not set"));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Create a new Gemini client from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::new(GeminiConfig::from_env())
    }

    /// Describe a single image.
    pub async fn describe_image(&self, image_path: &Path) -> WorkerResult<String> {
        let bytes = tokio::fs::read(image_path).await?;
        let request = GeminiRequest {
            system_instruction: None,
            contents: vec![Content {
                parts: vec![
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: image_mime_type(image_path).to_string(),
                            data: STANDARD.encode(&bytes),
                        },
                    },
                    Part::Text {
                        text: CAPTION_PROMPT.to_string(),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "text/plain".to_string(),
                response_schema: None,
                temperature: 0.2,
            },
        };

        let text = self.generate_with_fallback(&request).await?;
        Ok(text.trim().to_string())
    }

    /// Produce a structured summary of matched scenes.
    pub async fn summarize_scenes(&self, scenes: &Scenes) -> WorkerResult<StructuredSummary> {
        let scenes_json = serde_json::to_string_pretty(scenes)?;
        let request = GeminiRequest {
            system_instruction: Some(Content {
                parts: vec![Part::Text {
                    text: SUMMARY_SYSTEM_PROMPT.to_string(),
                }],
            }),
            contents: vec![Content {
                parts: vec![Part::Text {
                    text: format!("{}{}", SUMMARY_PROMPT, scenes_json),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: Some(summary_json_schema()),
                temperature: 0.4,
            },
        };

        let text = self.generate_with_fallback(&request).await?;
        serde_json::from_str(strip_json_fence(&text)).map_err(|e| {
            WorkerError::inference(format!("Failed to parse structured summary JSON: {}", e))
        })
    }

    async fn generate_with_fallback(&self, request: &GeminiRequest) -> WorkerResult<String> {
        let mut last_error = None;

        for model in self.config.models() {
            debug!("Attempting Gemini API with model: {}", model);
            match self.call_gemini_api(model, request).await {
                Ok(text) => return Ok(text),
                Err(e @ WorkerError::Authentication(_)) => return Err(e),
                Err(e) => {
                    warn!("Failed with model {}: {}", model, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| WorkerError::inference("All Gemini models failed")))
    }

    async fn call_gemini_api(&self, model: &str, request: &GeminiRequest) -> WorkerResult<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    WorkerError::TransientNetwork(format!("Gemini API request failed: {}", e))
                } else {
                    WorkerError::inference(format!("Gemini API request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkerError::from_http_status(status, error_text));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            WorkerError::inference(format!("Failed to parse Gemini response: {}", e))
        })?;

        let text: String = gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(WorkerError::inference("No content in Gemini response"));
        }
        info!(model, chars = text.len(), "Gemini response received");
        Ok(text)
    }
}

#[async_trait]
impl FrameCaptioner for GeminiClient {
    async fn caption(&self, image_path: &Path) -> MediaResult<String> {
        if !image_path.exists() {
            return Err(MediaError::FileNotFound(image_path.to_path_buf()));
        }
        self.describe_image(image_path)
            .await
            .map_err(|e| MediaError::internal(format!("gemini caption failed: {}", e)))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[async_trait]
impl Summarizer for GeminiClient {
    async fn summarize(&self, scenes: &Scenes) -> WorkerResult<StructuredSummary> {
        self.summarize_scenes(scenes).await
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

fn image_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Strip a markdown code fence around a JSON body, if any.
fn strip_json_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidmeta_models::{Scene, SceneId};
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(GeminiConfig {
            api_key: "test-key".into(),
            model: "primary".into(),
            fallback_models: vec!["backup".into()],
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn text_response(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }]
        }))
    }

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(strip_json_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_json_fence(" {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_models_deduplicated() {
        let config = GeminiConfig {
            model: "gemini-2.5-pro".into(),
            ..GeminiConfig::default()
        };
        assert_eq!(config.models(), vec!["gemini-2.5-pro", "gemini-2.5-flash-lite"]);
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            GeminiClient::new(GeminiConfig::default()),
            Err(WorkerError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_caption_sends_inline_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/primary:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{ "parts": [{ "inlineData": { "mimeType": "image/jpeg", "data": "AQID" } }] }]
            })))
            .respond_with(text_response("  A presenter holds a phone in a studio.\n"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("scene_0001.jpg");
        std::fs::write(&frame, [1u8, 2, 3]).unwrap();

        let caption = client(&server).caption(&frame).await.unwrap();
        assert_eq!(caption, "A presenter holds a phone in a studio.");
    }

    #[tokio::test]
    async fn test_summary_falls_back_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/primary:generateContent"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/backup:generateContent"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(text_response(
                "```json\n{\"title\":\"Gadget review\",\"summary\":\"A quick look.\",\"keypoints\":[{\"timestamp\":\"00:00:02\",\"text\":\"Unboxing\"}],\"topics\":[\"tech\"],\"content_type\":\"review\"}\n```",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let mut scenes = Scenes::new();
        scenes.insert(SceneId::new(1, 1), Scene::new(SceneId::new(1, 1), "00:00:02"));

        let summary = client(&server).summarize(&scenes).await.unwrap();
        assert_eq!(summary.title, "Gadget review");
        assert_eq!(summary.keypoints[0].text, "Unboxing");
        assert!(summary.call_to_action.is_none());
    }

    #[tokio::test]
    async fn test_summary_request_carries_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/primary:generateContent"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": { "responseSchema": summary_json_schema() }
            })))
            .respond_with(text_response(
                "{\"title\":\"t\",\"summary\":\"s\",\"keypoints\":[],\"topics\":[],\"content_type\":\"vlog\"}",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let summary = client(&server).summarize(&Scenes::new()).await.unwrap();
        assert_eq!(summary.content_type, "vlog");
    }

    #[tokio::test]
    async fn test_authentication_error_stops_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/primary:generateContent"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key invalid"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/backup:generateContent"))
            .respond_with(text_response("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server).summarize(&Scenes::new()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = client(&server).summarize(&Scenes::new()).await.unwrap_err();
        assert!(matches!(err, WorkerError::Inference(_)));
    }
}
