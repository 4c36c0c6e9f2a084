//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Default allow-list of source video extensions.
pub const DEFAULT_VIDEO_FORMATS: &[&str] = &[".mp4", ".avi", ".mov", ".mkv", ".webm", ".m4v"];

/// Job orchestration configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Accepted file extensions, lowercase with a leading dot
    pub supported_formats: Vec<String>,
    /// Delay between a terminal status and removal of the job's temp files
    pub cleanup_delay: Duration,
    /// Root for per-job scratch directories when the job has no temp dir
    pub work_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            supported_formats: DEFAULT_VIDEO_FORMATS.iter().map(|s| s.to_string()).collect(),
            cleanup_delay: Duration::from_secs(3600),
            work_dir: std::env::temp_dir().join("vidmeta"),
        }
    }
}

impl OrchestratorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            supported_formats: env_string("SUPPORTED_VIDEO_FORMATS")
                .map(|list| parse_formats(&list))
                .filter(|formats| !formats.is_empty())
                .unwrap_or(defaults.supported_formats),
            cleanup_delay: Duration::from_secs(env_or("JOB_CLEANUP_DELAY_SECS", 3600)),
            work_dir: env_string("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
        }
    }

    /// Whether `filename` carries one of the supported extensions.
    pub fn is_supported_format(&self, filename: &str) -> bool {
        file_extension(filename)
            .map(|ext| self.supported_formats.iter().any(|f| *f == ext))
            .unwrap_or(false)
    }
}

/// Lowercase extension of `filename` including the leading dot.
pub fn file_extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
}

fn parse_formats(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .map(|s| if s.starts_with('.') { s } else { format!(".{}", s) })
        .collect()
}

/// Structured pipeline configuration.
#[derive(Debug, Clone)]
pub struct StructuredConfig {
    /// Size of the shared worker pool for heavy inference branches
    pub workers: usize,
    /// Scenes described (OCR + captioning) in parallel within one job
    scene_parallel: usize,
    /// OCR lines below this confidence are dropped
    pub ocr_min_confidence: f64,
    /// Minimum overlap for a transcript segment to attach to a scene
    pub overlap_threshold_secs: f64,
    /// Assumed seconds per scene when a scene timestamp cannot be parsed
    pub fallback_scene_secs: f64,
}

impl Default for StructuredConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            scene_parallel: 4,
            ocr_min_confidence: 0.9,
            overlap_threshold_secs: 0.5,
            fallback_scene_secs: 5.0,
        }
    }
}

impl StructuredConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            workers: env_or("STRUCTURED_WORKERS", 2usize).max(1),
            scene_parallel: env_or("STRUCTURED_SCENE_PARALLEL", 4usize).max(1),
            ocr_min_confidence: env_or("OCR_MIN_CONFIDENCE", 0.9),
            overlap_threshold_secs: env_or("MATCH_OVERLAP_THRESHOLD_SECS", 0.5),
            fallback_scene_secs: env_or("MATCH_FALLBACK_SCENE_SECS", 5.0),
        }
    }

    /// Set how many scenes are described at once. Zero is raised to one.
    pub fn with_scene_parallel(mut self, scenes: usize) -> Self {
        self.scene_parallel = scenes.max(1);
        self
    }

    /// Scenes described at once, never zero.
    pub fn scene_parallel(&self) -> usize {
        self.scene_parallel.max(1)
    }
}

/// Floor for the indexing poll interval read from the environment.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Indexing workflow configuration.
#[derive(Debug, Clone)]
pub struct IndexingConfig {
    /// Existing index to upload into; a new one is created when unset
    pub index_id: Option<String>,
    /// Name used when creating an index
    pub index_name: String,
    /// Hard ceiling on uploaded file size
    pub max_file_bytes: u64,
    /// Total upload attempts, including the first
    pub upload_max_attempts: u32,
    /// Base delay for exponential upload backoff
    pub upload_base_delay: Duration,
    /// Fixed wait after a rate-limit response
    pub rate_limit_cooldown: Duration,
    /// First polling interval
    pub poll_interval: Duration,
    /// Polling interval ceiling
    pub max_poll_interval: Duration,
    /// Total time allowed for indexing to finish
    pub indexing_timeout: Duration,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            index_id: None,
            index_name: "vidmeta-index".to_string(),
            max_file_bytes: 2 * 1024 * 1024 * 1024,
            upload_max_attempts: 5,
            upload_base_delay: Duration::from_millis(2000),
            rate_limit_cooldown: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
            max_poll_interval: Duration::from_secs(60),
            indexing_timeout: Duration::from_secs(1800),
        }
    }
}

impl IndexingConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            index_id: env_string("TWELVE_LABS_INDEX_ID"),
            index_name: env_string("TWELVE_LABS_INDEX_NAME").unwrap_or(defaults.index_name),
            max_file_bytes: env_or("INDEXING_MAX_FILE_BYTES", defaults.max_file_bytes),
            upload_max_attempts: env_or("UPLOAD_MAX_ATTEMPTS", 5u32).max(1),
            upload_base_delay: Duration::from_millis(env_or("UPLOAD_BASE_DELAY_MS", 2000)),
            rate_limit_cooldown: Duration::from_secs(env_or("UPLOAD_RATE_LIMIT_COOLDOWN_SECS", 60)),
            poll_interval: Duration::from_secs(env_or("INDEXING_POLL_INTERVAL_SECS", 5))
                .max(MIN_POLL_INTERVAL),
            max_poll_interval: defaults.max_poll_interval,
            indexing_timeout: Duration::from_secs(env_or("INDEXING_TIMEOUT_SECS", 1800)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_formats_are_case_insensitive() {
        let config = OrchestratorConfig::default();
        assert!(config.is_supported_format("clip.MP4"));
        assert!(config.is_supported_format("a.b.webm"));
        assert!(!config.is_supported_format("notes.txt"));
        assert!(!config.is_supported_format("no_extension"));
    }

    #[test]
    fn test_parse_formats_adds_leading_dot() {
        assert_eq!(parse_formats("mp4, .MOV ,,"), vec![".mp4", ".mov"]);
    }

    #[test]
    fn test_defaults() {
        let indexing = IndexingConfig::default();
        assert_eq!(indexing.upload_max_attempts, 5);
        assert_eq!(indexing.max_file_bytes, 2_147_483_648);
        assert_eq!(StructuredConfig::default().workers, 2);
    }

    #[test]
    fn test_zero_poll_interval_is_raised_to_floor() {
        std::env::set_var("INDEXING_POLL_INTERVAL_SECS", "0");
        let config = IndexingConfig::from_env();
        std::env::remove_var("INDEXING_POLL_INTERVAL_SECS");
        assert_eq!(config.poll_interval, MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_scene_parallel_is_never_zero() {
        let config = StructuredConfig::default().with_scene_parallel(0);
        assert_eq!(config.scene_parallel(), 1);
        assert_eq!(StructuredConfig::default().scene_parallel(), 4);
    }
}
