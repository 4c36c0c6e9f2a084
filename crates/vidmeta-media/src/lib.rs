//! Media collaborators for the structured analysis pipeline.
//!
//! This crate provides:
//! - Provider traits for scene detection, OCR, frame captioning,
//!   audio extraction and transcription
//! - CLI-backed implementations: FFmpeg scene detection and audio
//!   extraction, Tesseract OCR, Whisper transcription
//! - A small FFmpeg command builder and a generic tool runner

pub mod audio;
pub mod command;
pub mod error;
pub mod ocr;
pub mod providers;
pub mod scene;
pub mod transcribe;

pub use audio::FfmpegAudioExtractor;
pub use command::{FfmpegCommand, ToolOutput};
pub use error::{MediaError, MediaResult};
pub use ocr::TesseractRecognizer;
pub use providers::{
    AudioExtractor, DetectedScene, FrameCaptioner, SceneDetector, TextRecognizer, Transcriber,
};
pub use scene::FfmpegSceneDetector;
pub use transcribe::WhisperTranscriber;
