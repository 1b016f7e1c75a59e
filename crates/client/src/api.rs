// crates/client/src/api.rs
//! REST client for the translation service. Every response uses the same
//! envelope: `code` 1000 means success, anything else is a service error
//! with `msg`. Payloads live under `data` (plus `all_results` on creation).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use polydub_engine::StatusSource;
use polydub_types::{CreatedJob, CreationOutcome, JobStatus, JobStatusReport, VideoRecord};

use crate::config::ClientConfig;

const TOKEN_PATH: &str = "/api/open/v3/getToken";
const LANGUAGE_LIST_PATH: &str = "/api/open/v3/language/list";
const VOICE_LIST_PATH: &str = "/api/open/v4/voice/videoTranslation";
const CREATE_PATH: &str = "/api/open/v3/content/video/createbytranslate";
const STATUS_PATH: &str = "/api/open/v3/content/video/infobymodelid";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Envelope code other than 1000.
    #[error("service error {code}: {message}")]
    Service { code: i64, message: String },
    #[error("no credentials configured: set an API token or client id/secret")]
    MissingCredentials,
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A target language offered by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct LanguageOption {
    pub lang_code: String,
    pub lang_name: String,
    /// Languages that require an explicit voice selection at creation time.
    #[serde(default)]
    pub need_voice_id: bool,
}

/// A voice available for one target language.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceOption {
    pub voice_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub language_code: String,
}

/// Parameters for one batch creation call.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationRequest {
    /// Source video URL.
    pub url: String,
    /// Comma-joined target language codes, as the service expects.
    pub language: String,
    /// "DEFAULT" lets the service auto-detect.
    pub source_language: String,
    pub lipsync: bool,
    pub speaker_num: u8,
    pub remove_bgm: bool,
    pub caption_type: u8,
    pub dynamic_duration: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption_url: Option<String>,
    #[serde(rename = "webhookUrl", skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// Per-language voice selection, keyed by language code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voices_map: Option<Value>,
}

impl TranslationRequest {
    pub fn new(url: impl Into<String>, languages: &[String]) -> Self {
        Self {
            url: url.into(),
            language: languages.join(","),
            source_language: "DEFAULT".to_string(),
            lipsync: true,
            speaker_num: 0,
            remove_bgm: false,
            caption_type: 0,
            dynamic_duration: false,
            caption_url: None,
            webhook_url: None,
            voices_map: None,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    all_results: Option<Vec<CreationEntry>>,
}

impl Envelope {
    fn check(self) -> Result<Self, ClientError> {
        if self.code == 1000 {
            Ok(self)
        } else {
            Err(ClientError::Service {
                code: self.code,
                message: self
                    .msg
                    .unwrap_or_else(|| "unspecified service error".to_string()),
            })
        }
    }
}

/// One per-language entry of a creation response's `all_results`.
#[derive(Deserialize)]
struct CreationEntry {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    data: Option<CreationRecord>,
}

#[derive(Deserialize)]
struct CreationRecord {
    #[serde(alias = "language_code", default)]
    language: Option<String>,
    #[serde(rename = "_id", alias = "video_id", default)]
    id: Option<String>,
    #[serde(default)]
    video_status: Option<u8>,
    #[serde(default)]
    progress: Option<u8>,
}

impl CreationRecord {
    fn into_job(self, fallback_language: Option<&str>) -> Option<CreatedJob> {
        let remote_id = self.id?;
        let language = self
            .language
            .or_else(|| fallback_language.map(str::to_string))?;
        Some(CreatedJob {
            language,
            remote_id,
            status: self
                .video_status
                .and_then(|code| JobStatus::try_from(code).ok())
                .unwrap_or(JobStatus::Queued),
            progress: self.progress.unwrap_or(0).min(100),
        })
    }
}

/// Authenticated HTTP client. Holds either a static API key or a bearer
/// token obtained through the getToken exchange.
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    bearer: RwLock<Option<String>>,
}

impl ServiceClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: None,
            client_id: config.client_id,
            client_secret: config.client_secret,
            bearer: RwLock::new(config.api_token),
        }
    }

    /// Use a static `x-api-key` header instead of the token exchange.
    pub fn with_api_key(config: ClientConfig, api_key: impl Into<String>) -> Self {
        let mut client = Self::new(config);
        client.api_key = Some(api_key.into());
        client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Exchange client id/secret for a bearer token and store it for
    /// subsequent calls.
    pub async fn get_token(&self) -> Result<String, ClientError> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(ClientError::MissingCredentials);
        };
        let envelope: Envelope = self
            .http
            .post(self.url(TOKEN_PATH))
            .json(&serde_json::json!({
                "clientId": client_id,
                "clientSecret": client_secret,
            }))
            .send()
            .await?
            .json()
            .await?;
        let envelope = envelope.check()?;
        let token = envelope
            .token
            .ok_or_else(|| ClientError::Malformed("token missing from response".into()))?;
        *self.bearer.write().await = Some(token.clone());
        Ok(token)
    }

    async fn authed(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, ClientError> {
        if let Some(key) = &self.api_key {
            return Ok(request.header("x-api-key", key));
        }
        if let Some(token) = self.bearer.read().await.as_deref() {
            return Ok(request.bearer_auth(token));
        }
        if self.client_id.is_some() {
            let token = self.get_token().await?;
            return Ok(request.bearer_auth(token));
        }
        Err(ClientError::MissingCredentials)
    }

    pub async fn list_languages(&self) -> Result<Vec<LanguageOption>, ClientError> {
        let request = self.authed(self.http.get(self.url(LANGUAGE_LIST_PATH))).await?;
        let envelope: Envelope = request.send().await?.json::<Envelope>().await?.check()?;
        let data = envelope
            .data
            .ok_or_else(|| ClientError::Malformed("language list missing data".into()))?;
        let list = data
            .get("lang_list")
            .cloned()
            .unwrap_or_else(|| Value::Array(vec![]));
        serde_json::from_value(list)
            .map_err(|e| ClientError::Malformed(format!("bad language list: {e}")))
    }

    pub async fn list_voices(&self, language_code: &str) -> Result<Vec<VoiceOption>, ClientError> {
        let request = self
            .authed(self.http.get(self.url(VOICE_LIST_PATH)))
            .await?
            .query(&[("language_code", language_code)]);
        let envelope: Envelope = request.send().await?.json::<Envelope>().await?.check()?;
        let data = envelope
            .data
            .ok_or_else(|| ClientError::Malformed("voice list missing data".into()))?;
        let list = data
            .get("result")
            .cloned()
            .unwrap_or_else(|| Value::Array(vec![]));
        serde_json::from_value(list)
            .map_err(|e| ClientError::Malformed(format!("bad voice list: {e}")))
    }

    /// Create one translation job per requested language. Entries that fail
    /// at creation are skipped with a warning; languages they cover come back
    /// as not-started when the registry is seeded.
    pub async fn create_translation(
        &self,
        request: &TranslationRequest,
    ) -> Result<CreationOutcome, ClientError> {
        let first_language = request.language.split(',').next().map(str::to_string);
        let req = self
            .authed(self.http.post(self.url(CREATE_PATH)))
            .await?
            .json(request);
        let envelope: Envelope = req.send().await?.json::<Envelope>().await?.check()?;

        let mut jobs = Vec::new();
        for entry in envelope.all_results.unwrap_or_default() {
            match (entry.code, entry.data) {
                (Some(1000), Some(record)) => {
                    if let Some(job) = record.into_job(None) {
                        jobs.push(job);
                    }
                }
                (code, _) => {
                    warn!(?code, "creation entry failed, language will not start");
                }
            }
        }

        // Single-language responses put the record in `data` instead.
        if jobs.is_empty() {
            if let Some(data) = envelope.data {
                if let Ok(record) = serde_json::from_value::<CreationRecord>(data) {
                    if let Some(job) = record.into_job(first_language.as_deref()) {
                        jobs.push(job);
                    }
                }
            }
        }

        debug!(jobs = jobs.len(), "translation batch created");
        Ok(CreationOutcome { jobs })
    }

    /// Query one job's current status by remote id.
    pub async fn video_status(&self, remote_id: &str) -> Result<JobStatusReport, ClientError> {
        let request = self
            .authed(self.http.get(self.url(STATUS_PATH)))
            .await?
            .query(&[("video_model_id", remote_id)]);
        let envelope: Envelope = request.send().await?.json::<Envelope>().await?.check()?;
        let data = envelope
            .data
            .ok_or_else(|| ClientError::Malformed("status response missing data".into()))?;
        let record: VideoRecord = serde_json::from_value(data)
            .map_err(|e| ClientError::Malformed(format!("bad video record: {e}")))?;
        JobStatusReport::try_from(record)
            .map_err(|e| ClientError::Malformed(format!("status for {remote_id}: {e}")))
    }
}

#[async_trait]
impl StatusSource for ServiceClient {
    async fn job_status(&self, remote_id: &str) -> anyhow::Result<JobStatusReport> {
        Ok(self.video_status(remote_id).await?)
    }
}
