//! Analysis kinds and their stored results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, ParseEnumError};

/// A kind of analysis a job can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    /// External multimodal indexing plus generated description
    Multimodal,
    /// Local scene/OCR/caption/transcript pipeline plus matching and summary
    Structured,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 2] = [AnalysisKind::Multimodal, AnalysisKind::Structured];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Multimodal => "multimodal",
            AnalysisKind::Structured => "structured",
        }
    }

    /// Human-readable description for discovery endpoints.
    pub fn description(&self) -> &'static str {
        match self {
            AnalysisKind::Multimodal => {
                "Indexes the video with a multimodal video understanding service and generates a structured description"
            }
            AnalysisKind::Structured => {
                "Extracts scenes, on-screen text, frame captions and transcript, aligns them on one timeline and summarizes the result"
            }
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "multimodal" => Ok(AnalysisKind::Multimodal),
            "structured" => Ok(AnalysisKind::Structured),
            _ => Err(ParseEnumError::new("analysis type", s.trim())),
        }
    }
}

/// Output of one analysis kind for one job. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub job_id: JobId,
    pub analysis_type: AnalysisKind,
    /// Kind-specific payload
    pub results: serde_json::Value,
    /// Seconds spent producing the payload
    pub processing_time: f64,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(
        job_id: JobId,
        analysis_type: AnalysisKind,
        results: serde_json::Value,
        processing_time: f64,
    ) -> Self {
        Self {
            job_id,
            analysis_type,
            results,
            processing_time,
            created_at: Utc::now(),
        }
    }
}
