//! Twelve Labs REST client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{IndexerError, IndexerResult};
use crate::service::IndexingService;
use crate::types::{
    CreateIndexRequest, CreatedTask, GenerateRequest, IndexCapabilities, IndexInfo, TaskResponse,
    TaskStatus,
};

const API_KEY_HEADER: &str = "x-api-key";
const GENERATE_TEMPERATURE: f32 = 0.7;

/// Configuration for the indexing client.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// API key sent with every request
    pub api_key: String,
    /// Base URL including the API version
    pub base_url: String,
    /// Request timeout (uploads included)
    pub timeout: Duration,
    /// Retries for idempotent reads
    pub max_retries: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.twelvelabs.io/v1.2".to_string(),
            timeout: Duration::from_secs(600),
            max_retries: 2,
        }
    }
}

impl IndexerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("TWELVE_LABS_API_KEY").unwrap_or_default(),
            base_url: std::env::var("TWELVE_LABS_BASE_URL").unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(
                std::env::var("TWELVE_LABS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            max_retries: std::env::var("TWELVE_LABS_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Client for the Twelve Labs video understanding API.
pub struct TwelveLabsClient {
    http: Client,
    config: IndexerConfig,
}

impl TwelveLabsClient {
    pub fn new(config: IndexerConfig) -> IndexerResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(IndexerError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> IndexerResult<Self> {
        Self::new(IndexerConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Turn a non-success response into an error.
    async fn check(response: Response) -> IndexerResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();

        Err(IndexerError::from_http_status(
            status.as_u16(),
            format!("{} failed: {}", url, body),
            retry_after,
        ))
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> IndexerResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = IndexerResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Indexing request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl IndexingService for TwelveLabsClient {
    async fn get_index(&self, index_id: &str) -> IndexerResult<IndexInfo> {
        let url = self.url(&format!("indexes/{}", index_id));
        self.with_retry(|| async {
            let response = self
                .http
                .get(&url)
                .header(API_KEY_HEADER, &self.config.api_key)
                .send()
                .await?;
            let index: IndexInfo = Self::check(response).await?.json().await?;
            Ok::<_, IndexerError>(index)
        })
        .await
    }

    async fn create_index(
        &self,
        name: &str,
        capabilities: &IndexCapabilities,
    ) -> IndexerResult<IndexInfo> {
        let request = CreateIndexRequest {
            index_name: name,
            models: &capabilities.models,
            addons: &capabilities.addons,
        };

        let response = self
            .http
            .post(self.url("indexes"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await?;
        let mut index: IndexInfo = Self::check(response).await?.json().await?;
        if index.index_name.is_none() {
            index.index_name = Some(name.to_string());
        }

        info!(index_id = %index.id, index_name = %name, "Created index");
        Ok(index)
    }

    async fn upload_video(&self, index_id: &str, path: &Path) -> IndexerResult<String> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());

        let part = Part::stream_with_length(file, size).file_name(file_name.clone());
        let form = Form::new()
            .text("index_id", index_id.to_string())
            .part("video_file", part);

        debug!(index_id = %index_id, file = %file_name, size, "Uploading video");
        let response = self
            .http
            .post(self.url("tasks"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .multipart(form)
            .send()
            .await?;
        let task: CreatedTask = Self::check(response).await?.json().await?;

        info!(index_id = %index_id, task_id = %task.id, "Video upload accepted");
        Ok(task.id)
    }

    async fn get_task(&self, task_id: &str) -> IndexerResult<TaskStatus> {
        let response = self
            .http
            .get(self.url(&format!("tasks/{}", task_id)))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await?;
        let task: TaskResponse = Self::check(response).await?.json().await?;
        Ok(task.into())
    }

    async fn generate_text(&self, video_id: &str, prompt: &str) -> IndexerResult<Value> {
        let url = self.url("generate");
        let request = GenerateRequest {
            video_id,
            prompt,
            temperature: GENERATE_TEMPERATURE,
        };

        self.with_retry(|| async {
            let response = self
                .http
                .post(&url)
                .header(API_KEY_HEADER, &self.config.api_key)
                .json(&request)
                .send()
                .await?;
            let body: Value = Self::check(response).await?.json().await?;
            Ok::<_, IndexerError>(body)
        })
        .await
    }
}
