//! Structured analysis pipeline.
//!
//! Two branches run concurrently on the shared [`WorkerPool`]:
//! - transcription: extract the audio track and transcribe it
//! - scenes: detect scenes, then OCR and caption each key frame
//!
//! Once both are joined the transcript is aligned onto the scenes and the
//! result is summarized.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vidmeta_media::{
    AudioExtractor, DetectedScene, FrameCaptioner, MediaError, SceneDetector, TextRecognizer,
    Transcriber,
};
use vidmeta_models::{AnalysisKind, Job, Scene, Scenes, StructuredSummary, TranscriptSegment};

use crate::analyzer::Analyzer;
use crate::config::StructuredConfig;
use crate::error::WorkerResult;
use crate::matcher::{match_transcript, MatchConfig};
use crate::pool::WorkerPool;

/// Produces the final structured summary from matched scenes.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, scenes: &Scenes) -> WorkerResult<StructuredSummary>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Payload stored for the `structured` analysis kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredOutput {
    pub scenes: Scenes,
    pub transcription: Vec<TranscriptSegment>,
    pub structured_summary: StructuredSummary,
}

/// External collaborators used by the pipeline.
#[derive(Clone)]
pub struct StructuredProviders {
    pub scene_detector: Arc<dyn SceneDetector>,
    pub text_recognizer: Arc<dyn TextRecognizer>,
    pub frame_captioner: Arc<dyn FrameCaptioner>,
    pub audio_extractor: Arc<dyn AudioExtractor>,
    pub transcriber: Arc<dyn Transcriber>,
    pub summarizer: Arc<dyn Summarizer>,
}

#[derive(Clone)]
pub struct StructuredPipeline {
    providers: StructuredProviders,
    pool: WorkerPool,
    config: StructuredConfig,
}

impl StructuredPipeline {
    pub fn new(providers: StructuredProviders, pool: WorkerPool, config: StructuredConfig) -> Self {
        Self {
            providers,
            pool,
            config,
        }
    }

    /// Run the full pipeline for one video.
    pub async fn run(&self, video_path: &Path, work_dir: &Path) -> WorkerResult<StructuredOutput> {
        tokio::fs::create_dir_all(work_dir).await?;

        let transcription = {
            let this = self.clone();
            let video = video_path.to_path_buf();
            let audio = work_dir.join("audio.wav");
            self.pool
                .run("transcription", async move { this.transcribe(&video, &audio).await })
        };
        let scenes = {
            let this = self.clone();
            let video = video_path.to_path_buf();
            let frames = work_dir.join("frames");
            self.pool
                .run("scenes", async move { this.process_scenes(&video, &frames).await })
        };
        let (transcription, mut scenes) = tokio::try_join!(transcription, scenes)?;

        if !transcription.is_empty() {
            scenes = match_transcript(scenes, &transcription, &MatchConfig::from(&self.config));
        }

        let structured_summary = self.providers.summarizer.summarize(&scenes).await?;
        info!(
            scenes = scenes.len(),
            segments = transcription.len(),
            summarizer = self.providers.summarizer.name(),
            "Structured analysis finished"
        );

        Ok(StructuredOutput {
            scenes,
            transcription,
            structured_summary,
        })
    }

    async fn transcribe(&self, video_path: &Path, audio_path: &Path) -> WorkerResult<Vec<TranscriptSegment>> {
        match self
            .providers
            .audio_extractor
            .extract_audio(video_path, audio_path)
            .await
        {
            Ok(()) => {}
            // Videos without an audio stream make ffmpeg exit non-zero.
            Err(e @ MediaError::CommandFailed { .. }) => {
                warn!("Audio extraction failed, continuing without transcript: {}", e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        }

        let segments = self.providers.transcriber.transcribe(audio_path).await?;
        debug!(
            transcriber = self.providers.transcriber.name(),
            segments = segments.len(),
            "Transcript ready"
        );
        Ok(segments)
    }

    async fn process_scenes(&self, video_path: &Path, frames_dir: &Path) -> WorkerResult<Scenes> {
        let detected = self
            .providers
            .scene_detector
            .detect_scenes(video_path, frames_dir)
            .await?;
        debug!(
            detector = self.providers.scene_detector.name(),
            scenes = detected.len(),
            "Scenes detected"
        );

        let scenes: Vec<Scene> = stream::iter(detected)
            .map(|scene| self.describe_scene(scene))
            .buffered(self.config.scene_parallel())
            .collect()
            .await;

        Ok(scenes.into_iter().map(|scene| (scene.id, scene)).collect())
    }

    /// OCR and caption one key frame. Provider failures leave the field empty.
    async fn describe_scene(&self, detected: DetectedScene) -> Scene {
        let DetectedScene {
            id,
            timestamp,
            frame_path,
            ..
        } = detected;
        let mut scene = Scene::new(id, timestamp).with_image(frame_name(&frame_path));

        let (ocr, caption) = tokio::join!(
            self.providers.text_recognizer.recognize(&frame_path),
            self.providers.frame_captioner.caption(&frame_path),
        );

        match ocr {
            Ok(captions) => scene.ocr_captions.extend(
                captions
                    .into_iter()
                    .filter(|c| c.confidence >= self.config.ocr_min_confidence),
            ),
            Err(e) => warn!(
                scene = %id,
                provider = self.providers.text_recognizer.name(),
                "OCR failed: {}", e
            ),
        }

        match caption {
            Ok(text) if !text.trim().is_empty() => scene.descriptions.push(text),
            Ok(_) => {}
            Err(e) => warn!(
                scene = %id,
                provider = self.providers.frame_captioner.name(),
                "Captioning failed: {}", e
            ),
        }

        scene
    }
}

fn frame_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[async_trait]
impl Analyzer for StructuredPipeline {
    fn kind(&self) -> AnalysisKind {
        AnalysisKind::Structured
    }

    async fn analyze(&self, job: &Job, work_dir: &Path) -> WorkerResult<serde_json::Value> {
        let started = Instant::now();
        let output = self
            .run(Path::new(&job.video_path), &work_dir.join("structured"))
            .await?;
        debug!(
            job_id = %job.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Structured payload built"
        );
        Ok(serde_json::to_value(output)?)
    }
}
