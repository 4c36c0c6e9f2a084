//! Worker metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder. Without a recorder these calls are no-ops.

use metrics::{counter, histogram};
use vidmeta_models::AnalysisKind;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "vidmeta_jobs_submitted_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vidmeta_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vidmeta_jobs_failed_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "vidmeta_jobs_cancelled_total";

    pub const ANALYSIS_TOTAL: &str = "vidmeta_analysis_total";
    pub const ANALYSIS_DURATION_SECONDS: &str = "vidmeta_analysis_duration_seconds";

    pub const UPLOAD_RETRIES_TOTAL: &str = "vidmeta_indexing_upload_retries_total";
    pub const INDEXING_POLLS_TOTAL: &str = "vidmeta_indexing_polls_total";
    pub const INDEXING_REUSED_TOTAL: &str = "vidmeta_indexing_reused_total";
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

pub fn record_job_failed() {
    counter!(names::JOBS_FAILED_TOTAL).increment(1);
}

pub fn record_job_cancelled() {
    counter!(names::JOBS_CANCELLED_TOTAL).increment(1);
}

/// Record the outcome and duration of one analysis kind.
pub fn record_analysis(kind: AnalysisKind, success: bool, duration_secs: f64) {
    let labels = [
        ("kind", kind.as_str().to_string()),
        ("outcome", if success { "success" } else { "failure" }.to_string()),
    ];
    counter!(names::ANALYSIS_TOTAL, &labels).increment(1);
    histogram!(names::ANALYSIS_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_upload_retries(retries: u64) {
    counter!(names::UPLOAD_RETRIES_TOTAL).increment(retries);
}

pub fn record_indexing_poll() {
    counter!(names::INDEXING_POLLS_TOTAL).increment(1);
}

pub fn record_indexing_reused() {
    counter!(names::INDEXING_REUSED_TOTAL).increment(1);
}
