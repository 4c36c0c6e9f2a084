//! Audio track extraction with FFmpeg.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::providers::AudioExtractor;

/// Extracts a 44.1 kHz stereo WAV track.
#[derive(Debug, Clone)]
pub struct FfmpegAudioExtractor {
    timeout: Option<Duration>,
}

impl Default for FfmpegAudioExtractor {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl FfmpegAudioExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(video_path: &Path, output_path: &Path) -> FfmpegCommand {
        FfmpegCommand::new(video_path, output_path)
            .no_video()
            .audio_bitrate("160k")
            .audio_format(2, 44100)
    }
}

#[async_trait]
impl AudioExtractor for FfmpegAudioExtractor {
    async fn extract_audio(&self, video_path: &Path, output_path: &Path) -> MediaResult<()> {
        if !video_path.exists() {
            return Err(MediaError::FileNotFound(video_path.to_path_buf()));
        }
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        Self::command(video_path, output_path).run(self.timeout).await?;
        debug!(output = %output_path.display(), "Extracted audio track");
        Ok(())
    }
}
