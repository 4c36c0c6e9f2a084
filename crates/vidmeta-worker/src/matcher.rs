//! Scene/transcript alignment.
//!
//! Scenes only carry a start timestamp, so each scene is given an inferred
//! window running up to the next scene's start. Transcript segments attach
//! to every scene window they overlap by more than a threshold; a segment
//! spanning a cut therefore lands in both scenes. Scenes left without any
//! segment get exactly one nearest-by-start segment, tagged as such.

use std::cmp::Ordering;

use tracing::{debug, warn};
use vidmeta_models::{timecode_to_seconds, Scene, SceneId, Scenes, TranscriptEntry, TranscriptSegment};

use crate::config::StructuredConfig;

/// Matching constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchConfig {
    /// Overlap (seconds) a segment needs to attach to a scene
    pub overlap_threshold: f64,
    /// Seconds per scene assumed when a timestamp cannot be parsed
    pub fallback_scene_secs: f64,
    /// Window length of the last scene when there is no transcript
    pub last_scene_pad: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.5,
            fallback_scene_secs: 5.0,
            last_scene_pad: 5.0,
        }
    }
}

impl From<&StructuredConfig> for MatchConfig {
    fn from(config: &StructuredConfig) -> Self {
        Self {
            overlap_threshold: config.overlap_threshold_secs,
            fallback_scene_secs: config.fallback_scene_secs,
            ..Self::default()
        }
    }
}

/// Inferred time window of one scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneWindow {
    pub id: SceneId,
    pub start: f64,
    pub end: f64,
}

/// Start of a scene in seconds, falling back to `scene_number * fallback`.
pub fn resolve_start(scene: &Scene, config: &MatchConfig) -> f64 {
    match timecode_to_seconds(&scene.timestamp) {
        Ok(seconds) => seconds,
        Err(e) => {
            let fallback = f64::from(scene.id.scene_number) * config.fallback_scene_secs;
            warn!(
                scene = %scene.id,
                timestamp = %scene.timestamp,
                fallback,
                "Unparseable scene timestamp, using fallback: {}", e
            );
            fallback
        }
    }
}

/// Scene windows in playback order.
///
/// Ties keep the scene map's key order. The last window ends at the latest
/// transcript end, or `last_scene_pad` after its start when the transcript
/// is empty.
pub fn scene_windows(
    scenes: &Scenes,
    transcript: &[TranscriptSegment],
    config: &MatchConfig,
) -> Vec<SceneWindow> {
    let mut starts: Vec<(SceneId, f64)> = scenes
        .values()
        .map(|scene| (scene.id, resolve_start(scene, config)))
        .collect();
    // sort_by is stable
    starts.sort_by(|a, b| a.1.total_cmp(&b.1));

    let transcript_end = transcript
        .iter()
        .map(|seg| seg.end)
        .max_by(|a, b| a.total_cmp(b));

    starts
        .iter()
        .enumerate()
        .map(|(i, &(id, start))| {
            let end = match starts.get(i + 1) {
                Some(&(_, next)) => next,
                None => transcript_end.unwrap_or(start + config.last_scene_pad),
            };
            SceneWindow { id, start, end }
        })
        .collect()
}

/// Attach transcript entries to every scene.
///
/// Existing transcription lists are replaced, so matching the same inputs
/// twice yields the same output. With a non-empty transcript every scene
/// ends up with at least one entry.
pub fn match_transcript(
    mut scenes: Scenes,
    transcript: &[TranscriptSegment],
    config: &MatchConfig,
) -> Scenes {
    let windows = scene_windows(&scenes, transcript, config);

    for scene in scenes.values_mut() {
        scene.transcription.clear();
    }

    for segment in transcript {
        for window in &windows {
            let overlap = segment.overlap_with(window.start, window.end);
            if overlap > config.overlap_threshold {
                if let Some(scene) = scenes.get_mut(&window.id) {
                    scene.transcription.push(TranscriptEntry::overlap(segment, overlap));
                }
            }
        }
    }

    for window in &windows {
        let Some(scene) = scenes.get_mut(&window.id) else {
            continue;
        };
        if !scene.transcription.is_empty() {
            continue;
        }
        if let Some(nearest) = nearest_segment(transcript, window.start) {
            debug!(scene = %window.id, text = %nearest.text, "Assigned nearest transcript segment");
            scene.transcription.push(TranscriptEntry::nearest(nearest));
        }
    }

    scenes
}

/// Segment whose start is closest to `at`; the earliest one wins ties.
fn nearest_segment(transcript: &[TranscriptSegment], at: f64) -> Option<&TranscriptSegment> {
    transcript.iter().min_by(|a, b| {
        let da = (a.start - at).abs();
        let db = (b.start - at).abs();
        da.partial_cmp(&db).unwrap_or(Ordering::Equal)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(number: u32, timestamp: &str) -> Scene {
        Scene::new(SceneId::new(number, 1), timestamp)
    }

    fn scenes(list: &[(u32, &str)]) -> Scenes {
        list.iter()
            .map(|&(n, ts)| (SceneId::new(n, 1), scene(n, ts)))
            .collect()
    }

    fn texts(scenes: &Scenes, number: u32) -> Vec<String> {
        scenes[&SceneId::new(number, 1)]
            .transcription
            .iter()
            .map(|e| e.text.clone())
            .collect()
    }

    #[test]
    fn test_two_scene_scenario() {
        let input = scenes(&[(1, "00:00:02"), (2, "00:00:10")]);
        let transcript = vec![
            TranscriptSegment::new(0.0, 5.0, "intro"),
            TranscriptSegment::new(5.0, 12.0, "body"),
        ];

        let out = match_transcript(input, &transcript, &MatchConfig::default());

        let a = &out[&SceneId::new(1, 1)].transcription;
        assert_eq!(a[0].text, "intro");
        assert!(matches!(
            a[0].match_kind,
            vidmeta_models::MatchKind::Overlap { overlap_duration } if (overlap_duration - 3.0).abs() < 1e-9
        ));
        // "body" spans the cut at 10s and overlaps both windows.
        assert_eq!(texts(&out, 1), vec!["intro", "body"]);
        assert_eq!(texts(&out, 2), vec!["body"]);
        assert!(out.values().flat_map(|s| &s.transcription).all(|e| !e.is_nearest_match()));
    }

    #[test]
    fn test_last_window_ends_at_transcript_end() {
        let input = scenes(&[(1, "00:00:00"), (2, "00:00:10")]);
        let transcript = vec![TranscriptSegment::new(0.0, 30.0, "long")];
        let windows = scene_windows(&input, &transcript, &MatchConfig::default());
        assert_eq!(windows[1].start, 10.0);
        assert_eq!(windows[1].end, 30.0);
    }

    #[test]
    fn test_last_window_padded_without_transcript() {
        let input = scenes(&[(1, "00:00:07")]);
        let windows = scene_windows(&input, &[], &MatchConfig::default());
        assert_eq!(windows[0].end, 12.0);

        let out = match_transcript(input, &[], &MatchConfig::default());
        assert!(out.values().all(|s| s.transcription.is_empty()));
    }

    #[test]
    fn test_unparseable_timestamp_uses_scene_number_fallback() {
        let input = scenes(&[(3, "garbage"), (1, "00:00:00")]);
        let windows = scene_windows(&input, &[], &MatchConfig::default());
        assert_eq!(windows[1].id, SceneId::new(3, 1));
        assert_eq!(windows[1].start, 15.0);
    }

    #[test]
    fn test_semicolon_timestamp_is_normalized() {
        let input = scenes(&[(1, "1;23")]);
        let windows = scene_windows(&input, &[], &MatchConfig::default());
        assert_eq!(windows[0].start, 83.0);
    }

    #[test]
    fn test_windows_sorted_by_start_with_stable_ties() {
        let input = scenes(&[(1, "00:00:20"), (2, "00:00:05"), (3, "00:00:05")]);
        let windows = scene_windows(&input, &[], &MatchConfig::default());
        let order: Vec<u32> = windows.iter().map(|w| w.id.scene_number).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(windows[0].end, 5.0);
        assert_eq!(windows[1].end, 20.0);
    }

    #[test]
    fn test_short_overlaps_fall_back_to_nearest() {
        let input = scenes(&[(1, "00:00:00"), (2, "00:00:10"), (3, "00:00:20")]);
        // Each segment barely touches a boundary; no overlap exceeds 0.5s.
        let transcript = vec![
            TranscriptSegment::new(9.8, 10.2, "cut one"),
            TranscriptSegment::new(19.9, 20.3, "cut two"),
        ];

        let out = match_transcript(input, &transcript, &MatchConfig::default());

        for scene in out.values() {
            assert_eq!(scene.transcription.len(), 1);
            assert!(scene.transcription[0].is_nearest_match());
        }
        assert_eq!(texts(&out, 1), vec!["cut one"]);
        assert_eq!(texts(&out, 2), vec!["cut one"]);
        assert_eq!(texts(&out, 3), vec!["cut two"]);
    }

    #[test]
    fn test_every_scene_gets_an_entry() {
        let input = scenes(&[(1, "00:00:00"), (2, "00:00:03"), (3, "00:01:00"), (4, "00:02:00")]);
        let transcript = vec![
            TranscriptSegment::new(0.0, 4.0, "a"),
            TranscriptSegment::new(4.0, 9.0, "b"),
        ];

        let out = match_transcript(input, &transcript, &MatchConfig::default());
        assert!(out.values().all(|s| !s.transcription.is_empty()));
    }

    #[test]
    fn test_matching_is_idempotent() {
        let input = scenes(&[(1, "00:00:02"), (2, "00:00:10")]);
        let transcript = vec![
            TranscriptSegment::new(0.0, 5.0, "intro"),
            TranscriptSegment::new(5.0, 12.0, "body"),
        ];
        let config = MatchConfig::default();

        let once = match_transcript(input, &transcript, &config);
        let twice = match_transcript(once.clone(), &transcript, &config);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let input = scenes(&[(1, "00:00:00"), (2, "00:00:10")]);
        let transcript = vec![TranscriptSegment::new(9.0, 12.0, "edge")];
        let strict = MatchConfig {
            overlap_threshold: 1.5,
            ..MatchConfig::default()
        };

        let out = match_transcript(input, &transcript, &strict);
        // 1.0s overlap with scene 1 is below the threshold, 2.0s with scene 2 is not.
        assert!(out[&SceneId::new(1, 1)].transcription[0].is_nearest_match());
        assert!(!out[&SceneId::new(2, 1)].transcription[0].is_nearest_match());
    }
}
