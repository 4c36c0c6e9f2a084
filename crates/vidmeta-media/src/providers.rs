//! Provider traits for the structured analysis collaborators.
//!
//! Each trait hides one external model or tool behind a uniform async
//! interface so the pipeline can compose them and tests can swap in fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use vidmeta_models::{OcrCaption, SceneId, TranscriptSegment};

use crate::error::MediaResult;

/// A scene boundary together with its representative frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedScene {
    pub id: SceneId,
    /// Start of the scene in seconds
    pub start_seconds: f64,
    /// Start of the scene as an `HH:MM:SS` timecode
    pub timestamp: String,
    /// Saved key frame
    pub frame_path: PathBuf,
}

/// Scene boundary detection.
#[async_trait]
pub trait SceneDetector: Send + Sync {
    /// Detect scenes in a video and save one key frame per scene into `frames_dir`.
    ///
    /// # Returns
    /// Scenes in playback order.
    async fn detect_scenes(
        &self,
        video_path: &Path,
        frames_dir: &Path,
    ) -> MediaResult<Vec<DetectedScene>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// On-screen text recognition (OCR).
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognize text lines in an image, with confidences in 0.0..=1.0.
    async fn recognize(&self, image_path: &Path) -> MediaResult<Vec<OcrCaption>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Visual description of a single frame.
#[async_trait]
pub trait FrameCaptioner: Send + Sync {
    async fn caption(&self, image_path: &Path) -> MediaResult<String>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Audio track extraction.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Write the audio track of `video_path` to `output_path`.
    async fn extract_audio(&self, video_path: &Path, output_path: &Path) -> MediaResult<()>;
}

/// Speech transcription.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio file into ordered segments.
    async fn transcribe(&self, audio_path: &Path) -> MediaResult<Vec<TranscriptSegment>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
