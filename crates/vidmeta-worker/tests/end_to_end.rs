//! End-to-end orchestration tests against in-memory stores and scripted collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vidmeta_indexer::{
    IndexCapabilities, IndexInfo, IndexerResult, IndexingService, TaskState, TaskStatus,
};
use vidmeta_media::{
    AudioExtractor, DetectedScene, FrameCaptioner, MediaResult, SceneDetector, TextRecognizer,
    Transcriber,
};
use vidmeta_models::{
    JobId, JobStatus, OcrCaption, SceneId, Scenes, StructuredSummary, TranscriptSegment,
};
use vidmeta_store::{JobStore, MemoryStore, ResultsStore};
use vidmeta_worker::structured::StructuredOutput;
use vidmeta_worker::{
    Analyzer, IndexingConfig, IndexingWorkflow, JobOrchestrator, JobStatusView,
    OrchestratorConfig, StructuredConfig, StructuredPipeline, StructuredProviders, SubmitRequest,
    Summarizer, WorkerPool, WorkerResult,
};

struct Detector {
    timestamps: Vec<&'static str>,
}

#[async_trait]
impl SceneDetector for Detector {
    async fn detect_scenes(&self, _video: &Path, frames_dir: &Path) -> MediaResult<Vec<DetectedScene>> {
        Ok(self
            .timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| {
                let number = i as u32 + 1;
                DetectedScene {
                    id: SceneId::new(number, 1),
                    start_seconds: 0.0,
                    timestamp: ts.to_string(),
                    frame_path: frames_dir.join(format!("scene_{}.jpg", number)),
                }
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "test-detector"
    }
}

struct NoText;

#[async_trait]
impl TextRecognizer for NoText {
    async fn recognize(&self, _image: &Path) -> MediaResult<Vec<OcrCaption>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "no-text"
    }
}

struct Captioner;

#[async_trait]
impl FrameCaptioner for Captioner {
    async fn caption(&self, _image: &Path) -> MediaResult<String> {
        Ok("a person talking to the camera".into())
    }

    fn name(&self) -> &'static str {
        "test-captioner"
    }
}

struct Audio;

#[async_trait]
impl AudioExtractor for Audio {
    async fn extract_audio(&self, _video: &Path, _output: &Path) -> MediaResult<()> {
        Ok(())
    }
}

struct Script;

#[async_trait]
impl Transcriber for Script {
    async fn transcribe(&self, _audio: &Path) -> MediaResult<Vec<TranscriptSegment>> {
        Ok(vec![
            TranscriptSegment::new(0.0, 5.0, "intro"),
            TranscriptSegment::new(5.0, 12.0, "body"),
        ])
    }

    fn name(&self) -> &'static str {
        "script"
    }
}

struct Titler;

#[async_trait]
impl Summarizer for Titler {
    async fn summarize(&self, scenes: &Scenes) -> WorkerResult<StructuredSummary> {
        Ok(StructuredSummary {
            title: "Product demo".into(),
            summary: format!("{} scenes", scenes.len()),
            ..Default::default()
        })
    }

    fn name(&self) -> &'static str {
        "titler"
    }
}

/// Indexing service that finishes every task on the second poll.
#[derive(Default)]
struct Indexer {
    uploads: AtomicU32,
    polls: AtomicU32,
}

#[async_trait]
impl IndexingService for Indexer {
    async fn get_index(&self, index_id: &str) -> IndexerResult<IndexInfo> {
        Ok(IndexInfo {
            id: index_id.to_string(),
            index_name: None,
        })
    }

    async fn create_index(&self, name: &str, _capabilities: &IndexCapabilities) -> IndexerResult<IndexInfo> {
        Ok(IndexInfo {
            id: "idx-1".into(),
            index_name: Some(name.to_string()),
        })
    }

    async fn upload_video(&self, _index_id: &str, _path: &Path) -> IndexerResult<String> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("task-{}", n))
    }

    async fn get_task(&self, task_id: &str) -> IndexerResult<TaskStatus> {
        let round = self.polls.fetch_add(1, Ordering::SeqCst);
        let ready = round % 2 == 1;
        Ok(TaskStatus {
            task_id: task_id.to_string(),
            state: if ready { TaskState::Ready } else { TaskState::Indexing },
            video_id: ready.then(|| format!("vid-{}", task_id)),
            progress: Some(if ready { 1.0 } else { 0.5 }),
            error: None,
        })
    }

    async fn generate_text(&self, video_id: &str, _prompt: &str) -> IndexerResult<serde_json::Value> {
        Ok(serde_json::json!({ "data": { "text": format!("description of {}", video_id) } }))
    }
}

struct Harness {
    dir: tempfile::TempDir,
    store: Arc<MemoryStore>,
    indexer: Arc<Indexer>,
    orchestrator: JobOrchestrator,
}

fn harness(timestamps: Vec<&'static str>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let indexer = Arc::new(Indexer::default());

    let providers = StructuredProviders {
        scene_detector: Arc::new(Detector { timestamps }),
        text_recognizer: Arc::new(NoText),
        frame_captioner: Arc::new(Captioner),
        audio_extractor: Arc::new(Audio),
        transcriber: Arc::new(Script),
        summarizer: Arc::new(Titler),
    };
    let structured: Arc<dyn Analyzer> = Arc::new(StructuredPipeline::new(
        providers,
        WorkerPool::new(2),
        StructuredConfig::default(),
    ));
    let multimodal: Arc<dyn Analyzer> = Arc::new(IndexingWorkflow::new(
        indexer.clone(),
        store.clone(),
        IndexingConfig {
            poll_interval: Duration::from_millis(2),
            max_poll_interval: Duration::from_millis(5),
            indexing_timeout: Duration::from_secs(5),
            ..IndexingConfig::default()
        },
    ));

    let orchestrator = JobOrchestrator::new(
        store.clone(),
        store.clone(),
        vec![structured, multimodal],
        OrchestratorConfig {
            cleanup_delay: Duration::from_secs(60),
            work_dir: dir.path().join("work"),
            ..OrchestratorConfig::default()
        },
    );

    Harness {
        dir,
        store,
        indexer,
        orchestrator,
    }
}

impl Harness {
    fn request(&self, name: &str, analyses: &str) -> SubmitRequest {
        let upload = self.dir.path().join(format!("upload-{}", name));
        std::fs::create_dir_all(&upload).unwrap();
        let video = upload.join("launch.mp4");
        std::fs::write(&video, b"fake video bytes").unwrap();
        SubmitRequest {
            video_path: video,
            filename: "launch.mp4".into(),
            content_type: Some("video/mp4".into()),
            size: Some(16),
            temp_dir: Some(upload),
            analyses: vec![analyses.into()],
            ..Default::default()
        }
    }

    async fn wait(&self, id: &JobId) -> JobStatusView {
        for _ in 0..500 {
            let view = self.orchestrator.get_status(id).await.unwrap();
            if view.status != JobStatus::Processing {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} stuck in processing", id);
    }
}

fn structured_output(view: &JobStatusView) -> StructuredOutput {
    let results = view.results.as_ref().unwrap();
    serde_json::from_value(results["structured"].clone()).unwrap()
}

fn texts(output: &StructuredOutput, scene: u32) -> Vec<String> {
    output.scenes[&SceneId::new(scene, 1)]
        .transcription
        .iter()
        .map(|entry| entry.text.clone())
        .collect()
}

#[tokio::test]
async fn test_job_runs_both_kinds_to_completion() {
    let h = harness(vec!["00:00:02", "00:00:10"]);

    let id = h
        .orchestrator
        .submit(h.request("a", "structured,multimodal"))
        .await
        .unwrap();
    let first = h.orchestrator.get_status(&id).await.unwrap();
    assert_eq!(first.status, JobStatus::Processing);

    let view = h.wait(&id).await;
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.video_id.as_deref(), Some("vid-task-1"));

    let output = structured_output(&view);
    assert_eq!(texts(&output, 1), vec!["intro", "body"]);
    assert_eq!(texts(&output, 2), vec!["body"]);
    assert_eq!(output.structured_summary.title, "Product demo");

    let multimodal = &view.results.as_ref().unwrap()["multimodal"];
    assert_eq!(multimodal["summary"], "description of vid-task-1");
    assert_eq!(multimodal["reused_existing_upload"], false);

    let job = h.store.get(&id).await.unwrap();
    assert!(job.processing_end_time.is_some());
    assert_eq!(job.content_type.as_deref(), Some("video/mp4"));
}

#[tokio::test]
async fn test_second_upload_of_same_file_reuses_video() {
    let h = harness(vec!["00:00:02"]);

    let first = h.orchestrator.submit(h.request("a", "multimodal")).await.unwrap();
    assert_eq!(h.wait(&first).await.status, JobStatus::Completed);

    let second = h.orchestrator.submit(h.request("b", "multimodal")).await.unwrap();
    let view = h.wait(&second).await;

    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.video_id.as_deref(), Some("vid-task-1"));
    let multimodal = &view.results.as_ref().unwrap()["multimodal"];
    assert_eq!(multimodal["reused_existing_upload"], true);
    assert_eq!(h.indexer.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_malformed_scene_timestamp_uses_fallback_start() {
    // Scene 2 falls back to 2 * 5 = 10 seconds.
    let h = harness(vec!["00:00:02", "garbage"]);

    let id = h.orchestrator.submit(h.request("a", "structured")).await.unwrap();
    let view = h.wait(&id).await;

    assert_eq!(view.status, JobStatus::Completed);
    let output = structured_output(&view);
    assert_eq!(texts(&output, 1), vec!["intro", "body"]);
    assert_eq!(texts(&output, 2), vec!["body"]);
}

#[tokio::test]
async fn test_cancelled_job_leaves_no_trace() {
    let h = harness(vec!["00:00:02", "00:00:10"]);
    let request = h.request("a", "structured,multimodal");
    let upload = request.temp_dir.clone().unwrap();

    let id = h.orchestrator.submit(request).await.unwrap();
    h.orchestrator.cancel(&id).await.unwrap();
    assert!(h.orchestrator.get_status(&id).await.unwrap_err().is_not_found());

    // In-flight analyses notice the deletion and clean up behind themselves.
    for _ in 0..100 {
        if !upload.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!upload.exists());
    assert_eq!(h.store.job_count().await, 0);
    assert!(h.store.get_all(&id).await.unwrap().is_empty());
}
