//! Scenes, OCR captions and transcript segments.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifies a detected scene and the representative frame inside it.
///
/// Displays and serializes as `"<scene>_<frame>"`, so it can key JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId {
    pub scene_number: u32,
    pub frame_number: u32,
}

impl SceneId {
    pub fn new(scene_number: u32, frame_number: u32) -> Self {
        Self {
            scene_number,
            frame_number,
        }
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.scene_number, self.frame_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid scene id '{0}', expected <scene>_<frame>")]
pub struct SceneIdError(pub String);

impl FromStr for SceneId {
    type Err = SceneIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scene, frame) = s.split_once('_').ok_or_else(|| SceneIdError(s.to_string()))?;
        let scene_number = scene.parse().map_err(|_| SceneIdError(s.to_string()))?;
        let frame_number = frame.parse().map_err(|_| SceneIdError(s.to_string()))?;
        Ok(Self::new(scene_number, frame_number))
    }
}

impl Serialize for SceneId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SceneId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Text recognized in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrCaption {
    pub text: String,
    /// Recognizer confidence, 0.0 to 1.0
    pub confidence: f64,
}

/// One spoken segment of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end: end.max(start),
            text: text.into(),
        }
    }

    /// Seconds of intersection with `[start, end)`. Negative when disjoint.
    pub fn overlap_with(&self, start: f64, end: f64) -> f64 {
        self.end.min(end) - self.start.max(start)
    }
}

/// How a transcript segment came to be attached to a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "match_type", rename_all = "snake_case")]
pub enum MatchKind {
    /// The segment intersects the scene window by more than the threshold.
    Overlap { overlap_duration: f64 },
    /// Nothing overlapped enough; this is the segment starting closest to the scene.
    NearestMatch,
}

/// A transcript segment attached to a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(flatten)]
    pub match_kind: MatchKind,
}

impl TranscriptEntry {
    pub fn overlap(segment: &TranscriptSegment, overlap_duration: f64) -> Self {
        Self {
            start: segment.start,
            end: segment.end,
            text: segment.text.clone(),
            match_kind: MatchKind::Overlap { overlap_duration },
        }
    }

    pub fn nearest(segment: &TranscriptSegment) -> Self {
        Self {
            start: segment.start,
            end: segment.end,
            text: segment.text.clone(),
            match_kind: MatchKind::NearestMatch,
        }
    }

    pub fn is_nearest_match(&self) -> bool {
        matches!(self.match_kind, MatchKind::NearestMatch)
    }
}

/// A detected scene with everything the pipeline attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    /// Start timecode as reported by the detector. May be malformed.
    pub timestamp: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub ocr_captions: Vec<OcrCaption>,
    #[serde(default)]
    pub descriptions: Vec<String>,
    #[serde(default)]
    pub transcription: Vec<TranscriptEntry>,
}

impl Scene {
    pub fn new(id: SceneId, timestamp: impl Into<String>) -> Self {
        Self {
            id,
            timestamp: timestamp.into(),
            images: Vec::new(),
            ocr_captions: Vec::new(),
            descriptions: Vec::new(),
            transcription: Vec::new(),
        }
    }

    pub fn with_image(mut self, path: impl Into<String>) -> Self {
        self.images.push(path.into());
        self
    }
}

/// Scenes keyed and ordered by id.
pub type Scenes = BTreeMap<SceneId, Scene>;
