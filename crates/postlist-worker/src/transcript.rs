//! Speech transcription.
//!
//! FFmpeg pulls a mono 16 kHz WAV out of the video, which is then posted to
//! an OpenAI-compatible `/audio/transcriptions` endpoint.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use postlist_media::extract_speech_audio;
use postlist_storage::RequestDir;

use crate::collaborators::Transcriber;
use crate::error::{WorkerError, WorkerResult};

/// Transcription service settings.
#[derive(Debug, Clone)]
pub struct TranscribeConfig {
    /// Full endpoint URL; transcription is disabled when unset
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    /// Upper bound on audio extraction
    pub extract_timeout_secs: u64,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            model: "whisper-1".to_string(),
            timeout: Duration::from_secs(120),
            extract_timeout_secs: 300,
        }
    }
}

impl TranscribeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("TRANSCRIBE_API_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            api_key: std::env::var("TRANSCRIBE_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            model: std::env::var("TRANSCRIBE_MODEL").unwrap_or(defaults.model),
            timeout: std::env::var("TRANSCRIBE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            extract_timeout_secs: defaults.extract_timeout_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Transcriber calling a speech-to-text HTTP service.
pub struct HttpTranscriber {
    config: TranscribeConfig,
    client: Client,
}

impl HttpTranscriber {
    pub fn new(config: TranscribeConfig) -> WorkerResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Send a WAV file to the transcription endpoint.
    pub async fn transcribe_audio(&self, audio: &Path) -> WorkerResult<String> {
        let url = self
            .config
            .api_url
            .as_deref()
            .ok_or_else(|| WorkerError::transcription_failed("TRANSCRIBE_API_URL not set"))?;

        let bytes = tokio::fs::read(audio).await?;
        debug!(bytes = bytes.len(), "Sending audio for transcription");

        let part = Part::bytes(bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| WorkerError::transcription_failed(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", "json");

        let mut request = self.client.post(url).multipart(form);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| WorkerError::transcription_failed(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::transcription_failed(format!(
                "service returned {}: {}",
                status, body
            )));
        }

        let parsed: TranscriptionResponse = response.json().await.map_err(|e| {
            WorkerError::transcription_failed(format!("invalid response: {}", e))
        })?;
        Ok(parsed.text.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, video: &Path, dir: &RequestDir) -> WorkerResult<String> {
        if self.config.api_url.is_none() {
            return Err(WorkerError::transcription_failed("TRANSCRIBE_API_URL not set"));
        }

        let audio = dir.audio_file();
        extract_speech_audio(video, &audio, self.config.extract_timeout_secs).await?;

        let text = self.transcribe_audio(&audio).await?;
        info!(chars = text.len(), "Transcribed speech");
        Ok(text)
    }
}
