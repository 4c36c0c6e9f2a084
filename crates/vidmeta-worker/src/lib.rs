//! Video analysis worker.
//!
//! This crate provides:
//! - Job orchestration (submit, status, cancel, deferred cleanup)
//! - The structured pipeline: scenes, OCR, captions, transcript, matching, summary
//! - The multimodal indexing workflow with upload retry and completion polling
//! - Gemini-backed frame captioning and summarization
//! - A bounded worker pool for inference calls

pub mod analyzer;
pub mod config;
pub mod error;
pub mod gemini;
pub mod indexing;
pub mod logging;
pub mod matcher;
pub mod metrics;
pub mod orchestrator;
pub mod pool;
pub mod retry;
pub mod structured;

pub use analyzer::Analyzer;
pub use config::{IndexingConfig, OrchestratorConfig, StructuredConfig};
pub use error::{WorkerError, WorkerResult};
pub use gemini::{GeminiClient, GeminiConfig};
pub use indexing::{IndexingWorkflow, MultimodalOutput};
pub use logging::JobLogger;
pub use matcher::{match_transcript, MatchConfig};
pub use orchestrator::{JobOrchestrator, JobStatusView, SubmitRequest};
pub use pool::WorkerPool;
pub use structured::{StructuredOutput, StructuredPipeline, StructuredProviders, Summarizer};
