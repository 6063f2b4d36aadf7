//! quizscribe - turn a video URL into a plain-text transcript
//!
//! This library normalizes video-platform URLs, fetches the audio track with an
//! external media-fetch service (yt-dlp), runs it through a speech-to-text
//! engine and guarantees that every temporary audio file is removed again.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod pipeline;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use extractors::youtube::{normalize, CanonicalVideoRef};
pub use extractors::{AudioArtifact, AudioFormat, MediaAcquirer, MediaFetcher};
pub use pipeline::{PipelineSettings, TranscriptResponse, TranscriptResult, TranscriptionPipeline};
pub use transcribe::{SpeechEngine, Transcriber};

use serde::Serialize;

/// Result type used by adapters that talk to external tools
pub type Result<T> = anyhow::Result<T>;

/// Failure of a pipeline run. Every variant carries the underlying cause text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Invalid video URL: {0}")]
    InvalidUrl(String),

    #[error("Audio acquisition failed: {0}")]
    AcquisitionFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Kind tag of a [`PipelineError`], for callers that branch on the failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    AcquisitionFailed,
    TranscriptionFailed,
    Internal,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            PipelineError::AcquisitionFailed(_) => ErrorKind::AcquisitionFailed,
            PipelineError::TranscriptionFailed(_) => ErrorKind::TranscriptionFailed,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The underlying cause, without the kind prefix
    pub fn cause(&self) -> &str {
        match self {
            PipelineError::InvalidUrl(cause)
            | PipelineError::AcquisitionFailed(cause)
            | PipelineError::TranscriptionFailed(cause)
            | PipelineError::Internal(cause) => cause,
        }
    }

    /// HTTP status class a request layer should answer with.
    ///
    /// Everything the caller can fix or retry is a 400; only unexpected
    /// failures are reported as 500.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidUrl | ErrorKind::AcquisitionFailed | ErrorKind::TranscriptionFailed => 400,
            ErrorKind::Internal => 500,
        }
    }

    /// Process exit code used by the command-line front end
    pub fn exit_code(&self) -> i32 {
        match self.status_code() {
            500 => 1,
            _ => 2,
        }
    }

    pub(crate) fn acquisition(err: &anyhow::Error) -> Self {
        PipelineError::AcquisitionFailed(format!("{err:#}"))
    }

    pub(crate) fn transcription(err: &anyhow::Error) -> Self {
        PipelineError::TranscriptionFailed(format!("{err:#}"))
    }
}
