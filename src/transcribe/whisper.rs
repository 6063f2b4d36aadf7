//! Whisper over HTTP
//!
//! Talks to any server implementing OpenAI's `/audio/transcriptions`
//! endpoint: the OpenAI API itself or a self-hosted whisper server that keeps
//! the model loaded between requests.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::SpeechEngine;
use crate::extractors::AudioArtifact;
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "whisper-1";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Speech engine backed by a Whisper HTTP API
pub struct WhisperApiEngine {
    base_url: String,
    model: String,
    api_key: Option<String>,
    language: Option<String>,
    client: reqwest::Client,
}

impl WhisperApiEngine {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            language: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'))
    }

    async fn build_form(&self, audio: &AudioArtifact) -> Result<Form> {
        let bytes = fs_err::tokio::read(&audio.path)
            .await
            .with_context(|| format!("Failed to read audio file {}", audio.path.display()))?;

        let file_name = audio
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("audio.{}", audio.format.as_str()));

        let file = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(audio.format.mime_type())?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "json");

        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        Ok(form)
    }
}

#[async_trait]
impl SpeechEngine for WhisperApiEngine {
    async fn recognize(&self, audio: &AudioArtifact) -> Result<String> {
        let form = self.build_form(audio).await?;

        let mut request = self.client.post(self.endpoint()).multipart(form);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach speech-to-text service")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|err| err.error.message)
                .unwrap_or(body);
            anyhow::bail!("HTTP {}: {}", status, message.trim());
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;

        Ok(parsed.text)
    }

    fn name(&self) -> &'static str {
        "whisper-api"
    }
}
