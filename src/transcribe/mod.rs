use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Backend, EngineConfig};
use crate::extractors::AudioArtifact;
use crate::{PipelineError, Result};

pub mod aws;
pub mod whisper;

pub use aws::AwsTranscribeEngine;
pub use whisper::WhisperApiEngine;

/// External speech-to-text engine.
///
/// Implementations hold whatever expensive state they need (HTTP clients,
/// SDK clients) and are shared read-only between concurrent runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Recognize the speech in the artifact's audio file
    async fn recognize(&self, audio: &AudioArtifact) -> Result<String>;

    /// Name of the engine, for logs
    fn name(&self) -> &'static str;

    /// Finish background cleanup left by abandoned recognitions
    async fn shutdown(&self) {}
}

/// Build the speech engine selected in the configuration
pub fn engine_from_config(config: &EngineConfig) -> Arc<dyn SpeechEngine> {
    match config.backend {
        Backend::Whisper => Arc::new(
            WhisperApiEngine::new(&config.whisper.base_url, &config.whisper.model)
                .with_api_key(config.whisper.api_key())
                .with_language(config.language.clone()),
        ),
        Backend::Aws => Arc::new(AwsTranscribeEngine::new(config.aws.clone(), config.language.clone())),
    }
}

/// Turns an audio artifact into plain text
#[derive(Clone)]
pub struct Transcriber {
    engine: Arc<dyn SpeechEngine>,
}

impl Transcriber {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self { engine }
    }

    /// Transcribe the artifact. Silence yields an empty string, not an error.
    pub async fn transcribe(&self, audio: &AudioArtifact) -> std::result::Result<String, PipelineError> {
        tracing::info!("Transcribing {} with {}", audio.path.display(), self.engine.name());

        let text = self
            .engine
            .recognize(audio)
            .await
            .map_err(|err| PipelineError::transcription(&err))?;

        let text = text.trim().to_string();
        tracing::info!("Transcription finished ({} characters)", text.len());
        Ok(text)
    }

    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}
