//! Job orchestration.
//!
//! The orchestrator validates submissions, creates the job record and runs
//! every requested analysis kind on a background task. Kinds run
//! concurrently and fail independently; once all of them have resolved the
//! job moves to its terminal status and a deferred cleanup of its scratch
//! directory is scheduled.
//!
//! All job state lives in the [`JobStore`] and [`ResultsStore`]. Deleting a
//! job there is how cancellation reaches running work: the next write from
//! an in-flight analysis finds the job gone and stops.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn, Instrument};
use vidmeta_models::{AnalysisKind, IndexingStatus, Job, JobId, JobStatus};
use vidmeta_store::{JobStore, ResultsStore, StoreError};

use crate::analyzer::Analyzer;
use crate::config::OrchestratorConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_async, RetryConfig, RetryDecision};

/// A new analysis job as handed over by the caller.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    /// Caller-chosen id; a UUID is generated when absent
    pub job_id: Option<String>,
    /// Where the uploaded video was saved
    pub video_path: PathBuf,
    /// Original file name, used for the format check and de-duplication
    pub filename: String,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    /// Directory holding the upload; removed with the job
    pub temp_dir: Option<PathBuf>,
    /// Requested analysis kinds; entries may be comma-separated lists
    pub analyses: Vec<String>,
}

/// Caller-facing snapshot of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexing_status: Option<IndexingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexing_progress: Option<f64>,
}

/// Runs analysis jobs against the configured analyzers.
#[derive(Clone)]
pub struct JobOrchestrator {
    jobs: Arc<dyn JobStore>,
    results: Arc<dyn ResultsStore>,
    analyzers: Arc<HashMap<AnalysisKind, Arc<dyn Analyzer>>>,
    config: Arc<OrchestratorConfig>,
}

impl JobOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        results: Arc<dyn ResultsStore>,
        analyzers: Vec<Arc<dyn Analyzer>>,
        config: OrchestratorConfig,
    ) -> Self {
        let analyzers = analyzers
            .into_iter()
            .map(|analyzer| (analyzer.kind(), analyzer))
            .collect();
        Self {
            jobs,
            results,
            analyzers: Arc::new(analyzers),
            config: Arc::new(config),
        }
    }

    /// Analysis kinds this orchestrator can run.
    pub fn supported_analysis_types(&self) -> Vec<AnalysisKind> {
        AnalysisKind::ALL
            .into_iter()
            .filter(|kind| self.analyzers.contains_key(kind))
            .collect()
    }

    pub fn analysis_descriptions(&self) -> BTreeMap<&'static str, &'static str> {
        self.supported_analysis_types()
            .into_iter()
            .map(|kind| (kind.as_str(), kind.description()))
            .collect()
    }

    pub fn supported_formats(&self) -> &[String] {
        &self.config.supported_formats
    }

    /// Validate and start a job. Returns as soon as the job is recorded.
    pub async fn submit(&self, request: SubmitRequest) -> WorkerResult<JobId> {
        let kinds = self.parse_kinds(&request.analyses)?;
        if !self.config.is_supported_format(&request.filename) {
            return Err(WorkerError::validation(format!(
                "Unsupported file format: {}. Supported formats: {}",
                request.filename,
                self.config.supported_formats.join(", ")
            )));
        }

        let job_id = match request.job_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => JobId::from_string(id),
            _ => JobId::new(),
        };

        let mut job = Job::new(
            job_id.clone(),
            request.filename,
            request.video_path.to_string_lossy(),
            kinds,
        );
        if let Some(temp_dir) = &request.temp_dir {
            job = job.with_temp_dir(temp_dir.to_string_lossy());
        }
        if let Some(content_type) = request.content_type {
            job = job.with_content_type(content_type);
        }
        if let Some(size) = request.size {
            job = job.with_video_size(size);
        }

        match self.jobs.create(&job).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(id)) => {
                return Err(WorkerError::validation(format!("Job {} already exists", id)))
            }
            Err(e) => return Err(e.into()),
        }
        metrics::record_job_submitted();

        let span = JobLogger::new(&job_id, "orchestrate").span();
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.run_job(job).await }.instrument(span));

        Ok(job_id)
    }

    /// Current state of a job plus any results stored so far.
    pub async fn get_status(&self, job_id: &JobId) -> WorkerResult<JobStatusView> {
        let job = self.jobs.get(job_id).await?;
        let stored = self.results.get_all(job_id).await?;

        let results = (!stored.is_empty()).then(|| {
            stored
                .into_iter()
                .map(|result| (result.analysis_type.as_str().to_string(), result.results))
                .collect()
        });

        Ok(JobStatusView {
            job_id: job.id.to_string(),
            status: job.status,
            results,
            error: job.error,
            video_id: job.video_id,
            index_id: job.index_id,
            indexing_status: job.indexing_status,
            indexing_progress: job.indexing_progress,
        })
    }

    /// Delete a job, its results and its scratch files.
    ///
    /// In-flight analyses are not interrupted; they stop at their next store write.
    pub async fn cancel(&self, job_id: &JobId) -> WorkerResult<()> {
        let job = self.jobs.get(job_id).await?;

        self.jobs.delete(job_id).await?;
        let removed = self.results.delete_all(job_id).await?;
        remove_job_dir(&self.job_dir(&job)).await;

        metrics::record_job_cancelled();
        info!(job_id = %job_id, results = removed, "Job cancelled");
        Ok(())
    }

    /// Parse raw kind names, accepting comma-separated entries.
    fn parse_kinds(&self, raw: &[String]) -> WorkerResult<Vec<AnalysisKind>> {
        let mut kinds = Vec::new();
        for name in raw.iter().flat_map(|entry| entry.split(',')) {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let kind: AnalysisKind = name.parse().map_err(|_| {
                WorkerError::validation(format!(
                    "Invalid analysis type: {}. Supported types: {}",
                    name,
                    self.supported_names()
                ))
            })?;
            if !self.analyzers.contains_key(&kind) {
                return Err(WorkerError::validation(format!(
                    "Analysis type {} is not available. Supported types: {}",
                    kind,
                    self.supported_names()
                )));
            }
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        if kinds.is_empty() {
            return Err(WorkerError::validation(format!(
                "At least one analysis type is required. Supported types: {}",
                self.supported_names()
            )));
        }
        Ok(kinds)
    }

    fn supported_names(&self) -> String {
        self.supported_analysis_types()
            .iter()
            .map(AnalysisKind::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Scratch directory for a job: its upload dir, or one under the work root.
    fn job_dir(&self, job: &Job) -> PathBuf {
        job.temp_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.work_dir.join(job.id.as_str()))
    }

    async fn run_job(&self, job: Job) {
        let logger = JobLogger::new(&job.id, "orchestrate");
        let kinds: Vec<&str> = job.analysis_types.iter().map(AnalysisKind::as_str).collect();
        logger.start(&format!("{} [{}]", job.filename, kinds.join(", ")));

        let work_dir = self.job_dir(&job);
        let outcomes = join_all(
            job.analysis_types
                .iter()
                .map(|&kind| self.run_kind(&job, kind, &work_dir)),
        )
        .await;

        let mut failures = Vec::new();
        for (kind, outcome) in job.analysis_types.iter().zip(outcomes) {
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {
                    logger.warn("job deleted while running, dropping remaining work");
                    // Analyses may have recreated scratch files after the cancel.
                    remove_job_dir(&work_dir).await;
                    return;
                }
                Err(e) => failures.push(format!("{}: {}", kind, e)),
            }
        }

        let (status, error) = if failures.is_empty() {
            (JobStatus::Completed, None)
        } else {
            (
                JobStatus::Failed,
                Some(format!("Analysis failed for {}", failures.join("; "))),
            )
        };

        match self.finish(&job.id, status, error.as_deref()).await {
            Ok(()) => {
                match status {
                    JobStatus::Completed => {
                        metrics::record_job_completed();
                        logger.finish("all analyses stored");
                    }
                    _ => {
                        metrics::record_job_failed();
                        logger.fail(error.as_deref().unwrap_or("analysis failed"));
                    }
                }
                self.schedule_cleanup(job.id.clone(), work_dir);
            }
            Err(e) if e.is_not_found() => {
                logger.warn("job deleted before its final status was written");
            }
            Err(e) => logger.fail(&format!("failed to record final status: {}", e)),
        }
    }

    /// Run one kind and store its payload.
    async fn run_kind(&self, job: &Job, kind: AnalysisKind, work_dir: &Path) -> WorkerResult<()> {
        let analyzer = self
            .analyzers
            .get(&kind)
            .ok_or_else(|| WorkerError::config_error(format!("No analyzer for {}", kind)))?;

        let started = Instant::now();
        let outcome = analyzer.analyze(job, work_dir).await;
        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_analysis(kind, outcome.is_ok(), elapsed);

        let payload = outcome.map_err(|e| {
            if !e.is_cancelled() {
                warn!(job_id = %job.id, analysis = %kind, "Analysis failed: {}", e);
            }
            e
        })?;

        match self.results.store(&job.id, kind, payload, elapsed).await {
            Ok(_) => {
                debug!(job_id = %job.id, analysis = %kind, elapsed, "Stored analysis result");
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(WorkerError::Cancelled(job.id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the terminal status, retrying connection failures.
    async fn finish(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let retry = RetryConfig::new("final status update")
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(500));
        let classify = |e: &StoreError| {
            if e.is_retryable() {
                RetryDecision::Backoff
            } else {
                RetryDecision::Stop
            }
        };

        retry_async(&retry, classify, || self.jobs.update_status(job_id, status, error))
            .await
            .into_result()
    }

    fn schedule_cleanup(&self, job_id: JobId, dir: PathBuf) {
        let jobs = Arc::clone(&self.jobs);
        let delay = self.config.cleanup_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match jobs.get(&job_id).await {
                Ok(_) => remove_job_dir(&dir).await,
                Err(e) if e.is_not_found() => {
                    debug!(job_id = %job_id, "Job gone before cleanup, nothing to do")
                }
                Err(e) => warn!(job_id = %job_id, "Skipping cleanup: {}", e),
            }
        });
    }
}

async fn remove_job_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "Removed job directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), "Failed to remove job directory: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vidmeta_store::MemoryStore;

    use vidmeta_indexer::TaskState;

    use crate::config::StructuredConfig;
    use crate::indexing::tests::{fast_config, task, FakeService};
    use crate::indexing::IndexingWorkflow;
    use crate::pool::WorkerPool;
    use crate::structured::tests::providers;
    use crate::structured::StructuredPipeline;

    struct FailingAnalyzer(AnalysisKind);

    #[async_trait]
    impl Analyzer for FailingAnalyzer {
        fn kind(&self) -> AnalysisKind {
            self.0
        }

        async fn analyze(&self, _job: &Job, _work_dir: &Path) -> WorkerResult<serde_json::Value> {
            Err(WorkerError::inference("model unavailable"))
        }
    }

    /// Blocks until released, so a test can act while the job is in flight.
    struct GatedAnalyzer {
        gate: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl Analyzer for GatedAnalyzer {
        fn kind(&self) -> AnalysisKind {
            AnalysisKind::Structured
        }

        async fn analyze(&self, _job: &Job, _work_dir: &Path) -> WorkerResult<serde_json::Value> {
            self.gate.notified().await;
            Ok(serde_json::json!({ "late": true }))
        }
    }

    struct Setup {
        dir: tempfile::TempDir,
        store: Arc<MemoryStore>,
        orchestrator: JobOrchestrator,
    }

    fn setup(analyzers: impl FnOnce(Arc<MemoryStore>) -> Vec<Arc<dyn Analyzer>>) -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let config = OrchestratorConfig {
            cleanup_delay: Duration::from_millis(20),
            work_dir: dir.path().join("work"),
            ..OrchestratorConfig::default()
        };
        let orchestrator = JobOrchestrator::new(
            store.clone(),
            store.clone(),
            analyzers(store.clone()),
            config,
        );
        Setup {
            dir,
            store,
            orchestrator,
        }
    }

    fn structured_only(_store: Arc<MemoryStore>) -> Vec<Arc<dyn Analyzer>> {
        let pipeline: Arc<dyn Analyzer> = Arc::new(StructuredPipeline::new(
            providers(false),
            WorkerPool::new(2),
            StructuredConfig::default(),
        ));
        vec![pipeline]
    }

    fn both(store: Arc<MemoryStore>) -> Vec<Arc<dyn Analyzer>> {
        let service = FakeService::ready_after(vec![
            task(TaskState::Indexing, Some(0.3), None),
            task(TaskState::Ready, Some(1.0), Some("vid-1")),
        ]);
        let mut analyzers = structured_only(store.clone());
        analyzers.push(Arc::new(IndexingWorkflow::new(
            Arc::new(service),
            store,
            fast_config(),
        )));
        analyzers
    }

    fn request(setup: &Setup, analyses: &str) -> SubmitRequest {
        let upload_dir = setup.dir.path().join("upload");
        std::fs::create_dir_all(&upload_dir).unwrap();
        let video = upload_dir.join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        SubmitRequest {
            video_path: video,
            filename: "clip.mp4".into(),
            temp_dir: Some(upload_dir),
            analyses: vec![analyses.to_string()],
            ..Default::default()
        }
    }

    async fn wait_terminal(orchestrator: &JobOrchestrator, id: &JobId) -> JobStatusView {
        for _ in 0..500 {
            let view = orchestrator.get_status(id).await.unwrap();
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached a terminal status", id);
    }

    #[tokio::test]
    async fn test_invalid_submissions_write_nothing() {
        let s = setup(structured_only);

        let err = s.orchestrator.submit(request(&s, "sentiment")).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("sentiment"));

        let err = s.orchestrator.submit(request(&s, " , ")).await.unwrap_err();
        assert!(err.is_validation());

        // Registered kinds only.
        let err = s.orchestrator.submit(request(&s, "multimodal")).await.unwrap_err();
        assert!(err.is_validation());

        let mut bad_format = request(&s, "structured");
        bad_format.filename = "notes.txt".into();
        assert!(s.orchestrator.submit(bad_format).await.unwrap_err().is_validation());

        assert_eq!(s.store.job_count().await, 0);
    }

    #[tokio::test]
    async fn test_submit_reports_processing_then_completes() {
        let s = setup(structured_only);
        let mut req = request(&s, "structured");
        req.job_id = Some("job-42".into());

        let id = s.orchestrator.submit(req).await.unwrap();
        assert_eq!(id.as_str(), "job-42");

        let view = s.orchestrator.get_status(&id).await.unwrap();
        assert_eq!(view.status, JobStatus::Processing);

        let view = wait_terminal(&s.orchestrator, &id).await;
        assert_eq!(view.status, JobStatus::Completed);
        assert!(view.error.is_none());
        let results = view.results.unwrap();
        assert!(results["structured"]["structured_summary"].is_object());
    }

    #[tokio::test]
    async fn test_duplicate_job_id_is_rejected() {
        let s = setup(structured_only);
        let mut req = request(&s, "structured");
        req.job_id = Some("dup".into());
        s.orchestrator.submit(req.clone()).await.unwrap();

        let err = s.orchestrator.submit(req).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_kinds_are_deduplicated() {
        let s = setup(both);
        let id = s
            .orchestrator
            .submit(request(&s, "Structured, multimodal,structured"))
            .await
            .unwrap();

        let job = s.store.get(&id).await.unwrap();
        assert_eq!(
            job.analysis_types,
            vec![AnalysisKind::Structured, AnalysisKind::Multimodal]
        );
        wait_terminal(&s.orchestrator, &id).await;
    }

    #[tokio::test]
    async fn test_one_failing_kind_does_not_abort_the_other() {
        let s = setup(|store| {
            let mut analyzers = structured_only(store);
            analyzers.push(Arc::new(FailingAnalyzer(AnalysisKind::Multimodal)));
            analyzers
        });
        let id = s
            .orchestrator
            .submit(request(&s, "structured,multimodal"))
            .await
            .unwrap();

        let view = wait_terminal(&s.orchestrator, &id).await;

        assert_eq!(view.status, JobStatus::Failed);
        let error = view.error.unwrap();
        assert!(error.contains("multimodal"));
        assert!(error.contains("model unavailable"));
        let results = view.results.unwrap();
        assert!(results.contains_key("structured"));
        assert!(!results.contains_key("multimodal"));
    }

    #[tokio::test]
    async fn test_both_kinds_complete_with_indexing_metadata() {
        let s = setup(both);
        let id = s
            .orchestrator
            .submit(request(&s, "structured,multimodal"))
            .await
            .unwrap();

        let view = wait_terminal(&s.orchestrator, &id).await;

        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.video_id.as_deref(), Some("vid-1"));
        assert_eq!(view.indexing_status, Some(IndexingStatus::Ready));
        assert_eq!(view.indexing_progress, Some(1.0));
        let results = view.results.unwrap();
        assert_eq!(results["multimodal"]["video_id"], "vid-1");
        assert_eq!(results["multimodal"]["reused_existing_upload"], false);
    }

    #[tokio::test]
    async fn test_cleanup_removes_upload_dir_after_delay() {
        let s = setup(structured_only);
        let req = request(&s, "structured");
        let upload_dir = req.temp_dir.clone().unwrap();

        let id = s.orchestrator.submit(req).await.unwrap();
        wait_terminal(&s.orchestrator, &id).await;

        for _ in 0..100 {
            if !upload_dir.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!upload_dir.exists());
        // The job record outlives its files.
        assert!(s.orchestrator.get_status(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_in_flight_job_removes_everything() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let analyzer_gate = gate.clone();
        let s = setup(move |_| {
            let gated: Arc<dyn Analyzer> = Arc::new(GatedAnalyzer { gate: analyzer_gate });
            vec![gated]
        });
        let req = request(&s, "structured");
        let upload_dir = req.temp_dir.clone().unwrap();

        let id = s.orchestrator.submit(req).await.unwrap();
        s.orchestrator.cancel(&id).await.unwrap();

        assert!(!upload_dir.exists());
        assert!(s.orchestrator.get_status(&id).await.unwrap_err().is_not_found());

        // Let the analyzer finish; its late result must not resurrect the job.
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(s.store.job_count().await, 0);
        assert!(s.store.get_all(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let s = setup(structured_only);
        let missing = JobId::from_string("nope");
        assert!(s.orchestrator.get_status(&missing).await.unwrap_err().is_not_found());
        assert!(s.orchestrator.cancel(&missing).await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_discovery_lists_registered_kinds() {
        let s = setup(structured_only);
        assert_eq!(
            s.orchestrator.supported_analysis_types(),
            vec![AnalysisKind::Structured]
        );
        let descriptions = s.orchestrator.analysis_descriptions();
        assert_eq!(descriptions.len(), 1);
        assert!(descriptions.contains_key("structured"));
    }
}
