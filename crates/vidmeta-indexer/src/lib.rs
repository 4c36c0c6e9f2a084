//! Client for the multimodal video indexing service.
//!
//! This crate provides:
//! - The [`IndexingService`] contract consumed by the indexing workflow
//! - [`TwelveLabsClient`], a REST implementation of it
//! - Wire types, the fixed capability profile and analysis prompt

pub mod client;
pub mod error;
pub mod service;
pub mod types;


pub use client::{IndexerConfig, TwelveLabsClient};
pub use error::{IndexerError, IndexerResult};
pub use service::{extract_generated_text, IndexingService, ANALYSIS_PROMPT};
pub use types::{IndexCapabilities, IndexInfo, IndexModel, TaskState, TaskStatus};
