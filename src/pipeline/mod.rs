use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod scratch;

use crate::config::Config;
use crate::extractors::youtube::{self, CanonicalVideoRef};
use crate::extractors::ytdlp::YtDlpFetcher;
use crate::extractors::MediaAcquirer;
use crate::transcribe::{self, Transcriber};
use crate::PipelineError;
use scratch::ScratchSlot;

/// Runtime knobs of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Where audio artifacts live while a run is in flight
    pub scratch_dir: PathBuf,

    pub acquire_timeout: Duration,

    pub transcribe_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir(),
            acquire_timeout: Duration::from_secs(600),
            transcribe_timeout: Duration::from_secs(1800),
        }
    }
}

/// Outcome of a successful run. `text` is empty for videos without speech.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptResult {
    pub text: String,
    pub title: String,
}

/// Response body handed to the request layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub transcript: String,
    pub video_title: String,
    pub url: String,
}

impl TranscriptResponse {
    pub fn new(result: TranscriptResult, url: impl Into<String>) -> Self {
        Self {
            transcript: result.text,
            video_title: result.title,
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Acquisition,
    Transcription,
}

impl Stage {
    fn interrupted(self, reason: String) -> PipelineError {
        match self {
            Stage::Acquisition => PipelineError::AcquisitionFailed(reason),
            Stage::Transcription => PipelineError::TranscriptionFailed(reason),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Stage::Acquisition => "acquisition",
            Stage::Transcription => "transcription",
        }
    }
}

/// URL in, transcript out.
///
/// Each run normalizes the URL, downloads the audio into its own scratch
/// slot, transcribes it and removes every file of the slot before returning,
/// whichever way the run ends. Runs share nothing but the fetcher and engine
/// handles, so one pipeline can serve concurrent requests.
pub struct TranscriptionPipeline {
    acquirer: MediaAcquirer,
    transcriber: Transcriber,
    settings: PipelineSettings,
}

impl TranscriptionPipeline {
    pub fn new(acquirer: MediaAcquirer, transcriber: Transcriber, settings: PipelineSettings) -> Self {
        Self {
            acquirer,
            transcriber,
            settings,
        }
    }

    /// Build the production pipeline: yt-dlp plus the configured speech engine
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        config.validate()?;

        let fetcher = YtDlpFetcher::with_binary(&config.fetcher.binary, config.fetcher.extra_args.clone());

        let engine = transcribe::engine_from_config(&config.engine);
        tracing::debug!("Using {} speech engine", engine.name());

        Ok(Self::new(
            MediaAcquirer::new(Arc::new(fetcher), config.fetcher.formats.clone()),
            Transcriber::new(engine),
            config.pipeline_settings(),
        ))
    }

    /// Wait for engine cleanup still in flight from abandoned runs
    pub async fn shutdown(&self) {
        self.transcriber.shutdown().await;
    }

    /// Run the whole pipeline for one submitted URL
    pub async fn run(&self, raw: &str) -> Result<TranscriptResult, PipelineError> {
        self.run_with_cancellation(raw, &CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but gives up on the current stage as soon as
    /// `cancel` fires. Scratch files are removed either way.
    pub async fn run_with_cancellation(
        &self,
        raw: &str,
        cancel: &CancellationToken,
    ) -> Result<TranscriptResult, PipelineError> {
        let video = youtube::normalize(raw)?;
        tracing::info!("Processing {}", video);

        let mut slot =
            ScratchSlot::create(&self.settings.scratch_dir).map_err(|err| PipelineError::acquisition(&err))?;

        let outcome = self.acquire_and_transcribe(&video, &slot, cancel).await;
        let cleanup = slot.release();

        finish(outcome, cleanup)
    }

    async fn acquire_and_transcribe(
        &self,
        video: &CanonicalVideoRef,
        slot: &ScratchSlot,
        cancel: &CancellationToken,
    ) -> Result<TranscriptResult, PipelineError> {
        let artifact = guarded(
            Stage::Acquisition,
            self.acquirer.acquire(video, slot),
            self.settings.acquire_timeout,
            cancel,
        )
        .await?;

        let text = guarded(
            Stage::Transcription,
            self.transcriber.transcribe(&artifact),
            self.settings.transcribe_timeout,
            cancel,
        )
        .await?;

        Ok(TranscriptResult {
            text,
            title: artifact.title,
        })
    }
}

/// Race a stage against its deadline and the cancellation token
async fn guarded<T, F>(stage: Stage, future: F, limit: Duration, cancel: &CancellationToken) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::warn!("{} cancelled", stage.name());
            Err(stage.interrupted("cancelled".to_string()))
        }
        outcome = tokio::time::timeout(limit, future) => match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", stage.name(), limit);
                Err(stage.interrupted(format!("timed out after {:?}", limit)))
            }
        },
    }
}

/// Combine a run's outcome with the result of removing its scratch files.
///
/// A cleanup failure never hides the run's own error; it only fails an
/// otherwise successful run.
fn finish(outcome: Result<TranscriptResult, PipelineError>, cleanup: io::Result<usize>) -> Result<TranscriptResult, PipelineError> {
    match (outcome, cleanup) {
        (Ok(result), Ok(removed)) => {
            tracing::debug!("Removed {} scratch file(s)", removed);
            Ok(result)
        }
        (Ok(_), Err(err)) => {
            tracing::error!("Failed to remove scratch audio after a successful run: {}", err);
            Err(PipelineError::Internal(format!("Failed to remove scratch audio: {}", err)))
        }
        (Err(err), Ok(removed)) => {
            tracing::debug!("Removed {} scratch file(s) after failed run", removed);
            Err(err)
        }
        (Err(err), Err(cleanup_err)) => {
            tracing::warn!("Failed to remove scratch audio after failed run: {}", cleanup_err);
            Err(err)
        }
    }
}
