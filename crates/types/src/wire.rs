// crates/types/src/wire.rs
//! Message shapes spoken by the remote service and the webhook bridge.
//!
//! The service is loose about field names (`_id` vs `video_id`, `video` vs
//! `url`, `status` vs `video_status`), so the raw records here carry serde
//! aliases and the typed forms are derived from them.

use serde::Deserialize;
use serde_json::Value;

use crate::status::{JobStatus, UnknownStatusCode};

/// A per-job update as delivered over the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub remote_id: String,
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub result_url: Option<String>,
}

/// One parsed frame from the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// Status update keyed by remote id.
    Event(JobEvent),
    /// Completion-only legacy shape: a result URL and a language code, no
    /// remote id and no explicit status. Interpreted as Completed at 100.
    ///
    /// Known simplification inherited from the service: this shape assumes a
    /// language code is never reused across concurrent sessions.
    LegacyCompletion { language: String, result_url: String },
    /// Connection-level failure with no job reference; fails the whole batch.
    GlobalError {
        message: String,
        error_code: Option<i64>,
    },
    /// Frame types we don't act on (`info`, `status_update`, malformed
    /// event payloads). Logged and dropped by the listener.
    Other,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

impl PushMessage {
    /// Parse one text frame. Returns `Err` only for non-JSON input; JSON that
    /// doesn't match a known shape comes back as [`PushMessage::Other`].
    pub fn parse(text: &str) -> Result<PushMessage, serde_json::Error> {
        let frame: RawFrame = serde_json::from_str(text)?;
        Ok(match frame.kind.as_str() {
            "event" => Self::from_event_data(frame.data.as_ref()),
            "error" => PushMessage::GlobalError {
                message: frame
                    .message
                    .unwrap_or_else(|| "translation service reported an error".to_string()),
                error_code: frame.error_code,
            },
            _ => PushMessage::Other,
        })
    }

    fn from_event_data(data: Option<&Value>) -> PushMessage {
        let Some(data) = data else {
            return PushMessage::Other;
        };
        let remote_id = data.get("_id").and_then(Value::as_str);
        let status_code = data.get("video_status").and_then(Value::as_u64);
        let url = data.get("url").and_then(Value::as_str);

        match (remote_id, status_code) {
            (Some(id), Some(code)) => {
                let Ok(status) = JobStatus::try_from(code.min(u8::MAX as u64) as u8) else {
                    return PushMessage::Other;
                };
                PushMessage::Event(JobEvent {
                    remote_id: id.to_string(),
                    status,
                    progress: data
                        .get("progress")
                        .and_then(Value::as_u64)
                        .map(|p| p.min(100) as u8),
                    result_url: url.map(str::to_string),
                })
            }
            // Legacy completion: url without a remote id, keyed by language.
            (None, _) => match (url, legacy_language(data)) {
                (Some(url), Some(language)) => PushMessage::LegacyCompletion {
                    language: language.to_string(),
                    result_url: url.to_string(),
                },
                _ => PushMessage::Other,
            },
            _ => PushMessage::Other,
        }
    }
}

fn legacy_language(data: &Value) -> Option<&str> {
    data.get("language_code")
        .and_then(Value::as_str)
        .or_else(|| data.get("language").and_then(Value::as_str))
}

/// Raw `data` record returned by the status query and by creation entries.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoRecord {
    #[serde(rename = "_id", alias = "video_id", default)]
    pub id: Option<String>,
    #[serde(alias = "status", default)]
    pub video_status: Option<u8>,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(alias = "url", default)]
    pub video: Option<String>,
    #[serde(alias = "error_message", default)]
    pub error_reason: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Typed response of one per-job status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusReport {
    pub status: JobStatus,
    pub progress: u8,
    pub result_url: Option<String>,
    pub error_reason: Option<String>,
}

impl TryFrom<VideoRecord> for JobStatusReport {
    type Error = UnknownStatusCode;

    fn try_from(record: VideoRecord) -> Result<Self, Self::Error> {
        let status = JobStatus::try_from(record.video_status.unwrap_or(0))?;
        Ok(JobStatusReport {
            status,
            progress: record.progress.unwrap_or(0).min(100),
            result_url: record.video,
            error_reason: record.error_reason,
        })
    }
}

/// One language that the creation call actually started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedJob {
    pub language: String,
    pub remote_id: String,
    /// Initial status from the creation response; Queued when absent.
    pub status: JobStatus,
    pub progress: u8,
}

/// Parsed result of the batch creation call: per-language successes only.
/// Requested languages missing from `jobs` never started.
#[derive(Debug, Clone, Default)]
pub struct CreationOutcome {
    pub jobs: Vec<CreatedJob>,
}

/// The update payload applied by the reconciler, from either channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub result_url: Option<String>,
    pub error_reason: Option<String>,
}

impl StatusUpdate {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: Some(0),
            result_url: None,
            error_reason: Some(reason.into()),
        }
    }

    pub fn completed(result_url: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: Some(100),
            result_url: Some(result_url.into()),
            error_reason: None,
        }
    }
}

impl From<JobEvent> for StatusUpdate {
    fn from(event: JobEvent) -> Self {
        Self {
            status: event.status,
            progress: event.progress,
            result_url: event.result_url,
            error_reason: None,
        }
    }
}

impl From<JobStatusReport> for StatusUpdate {
    fn from(report: JobStatusReport) -> Self {
        Self {
            status: report.status,
            progress: Some(report.progress),
            result_url: report.result_url,
            error_reason: report.error_reason,
        }
    }
}
