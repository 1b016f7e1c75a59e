// crates/types/src/job.rs
//! Per-language job records and the read-only batch snapshot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::status::JobStatus;

/// One remote translation unit for one target language.
///
/// `language` and `remote_id` are immutable for the job's lifetime; status,
/// progress, result URL and error reason are written only by the reconciler
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationJob {
    /// Target language code — the key into the batch's job map.
    pub language: String,
    /// Opaque identifier assigned by the remote service at creation time.
    pub remote_id: String,
    pub status: JobStatus,
    /// 0–100. Forced to 0 on Failed, 100 on Completed.
    pub progress: u8,
    /// Set exactly once, when the job completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    /// Set when the job fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl TranslationJob {
    pub fn new(
        language: impl Into<String>,
        remote_id: impl Into<String>,
        status: JobStatus,
        progress: u8,
    ) -> Self {
        Self {
            language: language.into(),
            remote_id: remote_id.into(),
            status,
            progress: progress.min(100),
            result_url: None,
            error_reason: None,
        }
    }
}

/// Read-only view of one batch, rebuilt after every accepted update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSnapshot {
    /// Generation counter identifying this submission session.
    pub generation: u64,
    /// Jobs keyed by target language code.
    pub jobs: HashMap<String, TranslationJob>,
    /// Languages the creation call never started (absent or failed creation
    /// entries). Distinct from Failed, which implies the job started.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub not_started: Vec<String>,
    /// Rounded mean progress over non-failed jobs; 0 when all have failed.
    pub overall_progress: u8,
    /// True iff the job map is non-empty and every job is terminal.
    pub batch_complete: bool,
}
