//! FFmpeg-based scene detection.
//!
//! Uses the `select` filter's scene-change score to keep the first frame
//! and every frame whose score exceeds the threshold, and `showinfo` to
//! report the presentation time of each kept frame on stderr.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use vidmeta_models::{seconds_to_timecode, SceneId};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::providers::{DetectedScene, SceneDetector};

/// Default scene-change score threshold (0.0 - 1.0).
pub const DEFAULT_SCENE_THRESHOLD: f64 = 0.3;

/// Scene detector backed by the `ffmpeg` CLI.
#[derive(Debug, Clone)]
pub struct FfmpegSceneDetector {
    threshold: f64,
    timeout: Option<Duration>,
}

impl Default for FfmpegSceneDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SCENE_THRESHOLD,
            timeout: Some(Duration::from_secs(900)),
        }
    }
}

impl FfmpegSceneDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            ..Self::default()
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("SCENE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SCENE_THRESHOLD),
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn filter(&self) -> String {
        format!(
            "select='eq(n,0)+gt(scene,{:.3})',showinfo",
            self.threshold
        )
    }
}

#[async_trait]
impl SceneDetector for FfmpegSceneDetector {
    async fn detect_scenes(
        &self,
        video_path: &Path,
        frames_dir: &Path,
    ) -> MediaResult<Vec<DetectedScene>> {
        if !video_path.exists() {
            return Err(MediaError::FileNotFound(video_path.to_path_buf()));
        }
        tokio::fs::create_dir_all(frames_dir).await?;

        let pattern = frames_dir.join("scene_%04d.jpg");
        let output = FfmpegCommand::new(video_path, &pattern)
            .log_level("info")
            .video_filter(self.filter())
            .output_args(["-vsync", "vfr", "-q:v", "2"])
            .run(self.timeout)
            .await?;

        let starts = parse_showinfo(&output.stderr);
        if starts.is_empty() {
            return Err(MediaError::invalid_output(
                "ffmpeg",
                "showinfo reported no frames",
            ));
        }

        let mut scenes = Vec::with_capacity(starts.len());
        for (idx, start) in starts.into_iter().enumerate() {
            let scene_number = idx as u32 + 1;
            let frame_path = frames_dir.join(format!("scene_{:04}.jpg", scene_number));
            if !frame_path.exists() {
                warn!(
                    scene = scene_number,
                    path = %frame_path.display(),
                    "Scene frame missing, skipping"
                );
                continue;
            }
            scenes.push(DetectedScene {
                id: SceneId::new(scene_number, 1),
                start_seconds: start,
                timestamp: seconds_to_timecode(start),
                frame_path,
            });
        }

        info!(
            video = %video_path.display(),
            scenes = scenes.len(),
            threshold = self.threshold,
            "Scene detection finished"
        );
        Ok(scenes)
    }

    fn name(&self) -> &'static str {
        "ffmpeg-scene"
    }
}

/// Extract `pts_time` values from ffmpeg `showinfo` log lines.
pub fn parse_showinfo(stderr: &str) -> Vec<f64> {
    stderr
        .lines()
        .filter(|line| line.contains("Parsed_showinfo"))
        .filter_map(|line| {
            let rest = line.split("pts_time:").nth(1)?;
            rest.split_whitespace().next()?.parse::<f64>().ok()
        })
        .filter(|t| t.is_finite() && *t >= 0.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOWINFO: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'reel.mp4':
[Parsed_showinfo_1 @ 0x55d0c8f0] config in time_base: 1/15360, frame_rate: 30/1
[Parsed_showinfo_1 @ 0x55d0c8f0] n:   0 pts:      0 pts_time:0       duration:    512 fmt:yuv420p
[Parsed_showinfo_1 @ 0x55d0c8f0] n:   1 pts:  33280 pts_time:2.16667 duration:    512 fmt:yuv420p
[Parsed_showinfo_1 @ 0x55d0c8f0] n:   2 pts: 161280 pts_time:10.5    duration:    512 fmt:yuv420p
frame=    3 fps=0.0 q=2.0 Lsize=N/A time=00:00:10.53 bitrate=N/A speed=40x";

    #[test]
    fn test_parse_showinfo() {
        let starts = parse_showinfo(SHOWINFO);
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[0], 0.0);
        assert!((starts[1] - 2.16667).abs() < 1e-9);
        assert_eq!(starts[2], 10.5);
    }

    #[test]
    fn test_parse_showinfo_ignores_other_lines() {
        assert!(parse_showinfo("frame=  10 fps=25\npts_time:4").is_empty());
    }

    #[test]
    fn test_filter_keeps_first_frame() {
        let detector = FfmpegSceneDetector::new(0.4);
        assert_eq!(detector.filter(), "select='eq(n,0)+gt(scene,0.400)',showinfo");
    }

    #[tokio::test]
    async fn test_missing_video_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = FfmpegSceneDetector::default()
            .detect_scenes(&dir.path().join("missing.mp4"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
