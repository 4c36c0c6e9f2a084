//! Shared data models for the VidMeta backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their lifecycle status and indexing metadata
//! - Analysis kinds and stored analysis results
//! - Scenes, OCR captions and transcript segments
//! - Structured summaries
//! - Timecode parsing and formatting

pub mod analysis;
pub mod job;
pub mod scene;
pub mod summary;
pub mod timestamp;

// Re-export common types
pub use analysis::{AnalysisKind, AnalysisResult};
pub use job::{IndexingStatus, IndexingUpdate, Job, JobId, JobStatus, ParseEnumError};
pub use scene::{
    MatchKind, OcrCaption, Scene, SceneId, SceneIdError, Scenes, TranscriptEntry,
    TranscriptSegment,
};
pub use summary::{summary_json_schema, Keypoint, StructuredSummary};
pub use timestamp::{seconds_to_timecode, timecode_to_seconds, TimestampError};
