//! Application state.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use vidmeta_indexer::{IndexerConfig, TwelveLabsClient};
use vidmeta_media::{
    FfmpegAudioExtractor, FfmpegSceneDetector, TesseractRecognizer, WhisperTranscriber,
};
use vidmeta_store::RedisStore;
use vidmeta_worker::{
    Analyzer, GeminiClient, IndexingConfig, IndexingWorkflow, JobOrchestrator,
    OrchestratorConfig, StructuredConfig, StructuredPipeline, StructuredProviders, WorkerPool,
};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: JobOrchestrator,
}

impl AppState {
    /// Wire the Redis stores and every analyzer whose credentials are configured.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let store = Arc::new(RedisStore::from_env().context("invalid REDIS_URL")?);
        store.ping().await.context("Redis is not reachable")?;

        let mut analyzers: Vec<Arc<dyn Analyzer>> = Vec::new();

        match GeminiClient::from_env() {
            Ok(gemini) => {
                let gemini = Arc::new(gemini);
                let structured = StructuredConfig::from_env();
                let providers = StructuredProviders {
                    scene_detector: Arc::new(FfmpegSceneDetector::from_env()),
                    text_recognizer: Arc::new(TesseractRecognizer::default()),
                    frame_captioner: gemini.clone(),
                    audio_extractor: Arc::new(FfmpegAudioExtractor::new()),
                    transcriber: Arc::new(WhisperTranscriber::from_env()),
                    summarizer: gemini,
                };
                let pool = WorkerPool::new(structured.workers);
                analyzers.push(Arc::new(StructuredPipeline::new(providers, pool, structured)));
            }
            Err(e) => warn!("Structured analysis disabled: {}", e),
        }

        let indexer_config = IndexerConfig::from_env();
        if indexer_config.is_configured() {
            let indexer =
                TwelveLabsClient::new(indexer_config).context("failed to build indexing client")?;
            analyzers.push(Arc::new(IndexingWorkflow::new(
                Arc::new(indexer),
                store.clone(),
                IndexingConfig::from_env(),
            )));
        } else {
            warn!("Multimodal analysis disabled: TWELVE_LABS_API_KEY not set");
        }

        if analyzers.is_empty() {
            anyhow::bail!("no analysis kind is configured; set GEMINI_API_KEY or TWELVE_LABS_API_KEY");
        }

        let orchestrator = JobOrchestrator::new(
            store.clone(),
            store,
            analyzers,
            OrchestratorConfig::from_env(),
        );
        info!(
            analyses = ?orchestrator.supported_analysis_types(),
            "Analyzers ready"
        );

        Ok(Self::with_orchestrator(config, orchestrator))
    }

    pub fn with_orchestrator(config: ApiConfig, orchestrator: JobOrchestrator) -> Self {
        Self {
            config,
            orchestrator,
        }
    }
}
