//! Speech transcription with the Whisper CLI.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;
use vidmeta_models::TranscriptSegment;

use crate::command::run_tool;
use crate::error::{MediaError, MediaResult};
use crate::providers::Transcriber;

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

/// Transcriber that shells out to `whisper` and reads its JSON output.
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    model: String,
    timeout: Option<Duration>,
}

impl Default for WhisperTranscriber {
    fn default() -> Self {
        Self {
            model: "large".to_string(),
            timeout: Some(Duration::from_secs(1800)),
        }
    }
}

impl WhisperTranscriber {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        match std::env::var("WHISPER_MODEL") {
            Ok(model) if !model.trim().is_empty() => Self::new(model.trim()),
            _ => Self::default(),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> MediaResult<Vec<TranscriptSegment>> {
        if !audio_path.exists() {
            return Err(MediaError::FileNotFound(audio_path.to_path_buf()));
        }

        let output_dir = audio_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let args = vec![
            audio_path.to_string_lossy().to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--verbose".to_string(),
            "False".to_string(),
        ];
        run_tool("whisper", &args, self.timeout).await?;

        let stem = audio_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| MediaError::internal("audio path has no file name"))?;
        let json_path = output_dir.join(format!("{}.json", stem));
        let raw = tokio::fs::read_to_string(&json_path).await?;
        let segments = parse_whisper_json(&raw)?;

        info!(
            audio = %audio_path.display(),
            segments = segments.len(),
            model = %self.model,
            "Transcription finished"
        );
        Ok(segments)
    }

    fn name(&self) -> &'static str {
        "whisper"
    }
}

/// Parse Whisper's JSON output into segments rounded to 0.1 s.
pub fn parse_whisper_json(raw: &str) -> MediaResult<Vec<TranscriptSegment>> {
    let output: WhisperOutput = serde_json::from_str(raw)?;
    Ok(output
        .segments
        .into_iter()
        .filter(|s| s.start.is_finite() && s.end.is_finite())
        .map(|s| TranscriptSegment::new(round_tenth(s.start), round_tenth(s.end), s.text.trim()))
        .collect())
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whisper_json_rounds() {
        let raw = r#"{
            "text": " Hello there. Welcome back.",
            "segments": [
                {"id": 0, "start": 0.0, "end": 2.34, "text": " Hello there."},
                {"id": 1, "start": 2.34, "end": 5.06, "text": " Welcome back."}
            ],
            "language": "en"
        }"#;
        let segments = parse_whisper_json(raw).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].end, 2.3);
        assert_eq!(segments[1].start, 2.3);
        assert_eq!(segments[1].end, 5.1);
        assert_eq!(segments[1].text, "Welcome back.");
    }

    #[test]
    fn test_parse_whisper_json_without_segments() {
        assert!(parse_whisper_json(r#"{"text": ""}"#).unwrap().is_empty());
        assert!(parse_whisper_json("not json").is_err());
    }
}
