use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod youtube;
pub mod ytdlp;

use crate::pipeline::scratch::ScratchSlot;
use crate::{PipelineError, Result};
use youtube::CanonicalVideoRef;

/// Title used when the media-fetch service reports none
pub const UNTITLED: &str = "Untitled Video";

/// Default format preference: m4a audio first, any audio-only stream next,
/// the best muxed stream as the last resort.
pub fn default_formats() -> Vec<String> {
    vec![
        "bestaudio[ext=m4a]".to_string(),
        "bestaudio".to_string(),
        "best".to_string(),
    ]
}

/// Audio containers the fetcher may leave behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Mp4,
    Wav,
    Flac,
    Ogg,
    Opus,
    Webm,
}

impl AudioFormat {
    /// Order in which the scratch directory is probed after a download
    pub const PROBE_ORDER: [AudioFormat; 8] = [
        AudioFormat::Webm,
        AudioFormat::M4a,
        AudioFormat::Mp3,
        AudioFormat::Wav,
        AudioFormat::Ogg,
        AudioFormat::Opus,
        AudioFormat::Flac,
        AudioFormat::Mp4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Mp4 => "mp4",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Opus => "opus",
            AudioFormat::Webm => "webm",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" | "aac" => Some(AudioFormat::M4a),
            "mp4" => Some(AudioFormat::Mp4),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "ogg" => Some(AudioFormat::Ogg),
            "opus" => Some(AudioFormat::Opus),
            "webm" => Some(AudioFormat::Webm),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Mp4 => "video/mp4",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Opus => "audio/ogg",
            AudioFormat::Webm => "audio/webm",
        }
    }
}

/// A downloaded audio file and the title of the video it came from.
///
/// Created by [`MediaAcquirer::acquire`] inside a [`ScratchSlot`]; the
/// pipeline deletes the file before a run returns.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub title: String,
}

/// What the media-fetch service reported back
#[derive(Debug, Clone, Default)]
pub struct FetchedMedia {
    /// Video title, taken from the same request that fetched the media
    pub title: Option<String>,

    /// Final output file, when the service reports it
    pub path: Option<PathBuf>,
}

/// External service that downloads the audio track of a video
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `url` using the `/`-separated format selector.
    ///
    /// `output_template` contains a `%(ext)s` placeholder that the service
    /// replaces with the extension of the container it ends up writing.
    async fn fetch(&self, url: &str, format_selector: &str, output_template: &Path) -> Result<FetchedMedia>;

    /// Name of the service, for logs
    fn name(&self) -> &'static str;
}

/// Turns a canonical video reference into a local audio artifact
pub struct MediaAcquirer {
    fetcher: Arc<dyn MediaFetcher>,
    formats: Vec<String>,
}

impl MediaAcquirer {
    pub fn new(fetcher: Arc<dyn MediaFetcher>, formats: Vec<String>) -> Self {
        Self { fetcher, formats }
    }

    /// Format selector handed to the fetcher, most preferred first
    pub fn format_selector(&self) -> String {
        self.formats.join("/")
    }

    /// Fetch the audio of `video` into `slot`.
    ///
    /// Files the fetcher wrote before failing stay in the slot; removing them
    /// is the slot owner's job.
    pub async fn acquire(&self, video: &CanonicalVideoRef, slot: &ScratchSlot) -> std::result::Result<AudioArtifact, PipelineError> {
        let url = video.url();
        let selector = self.format_selector();
        let template = slot.output_template();

        tracing::info!("Fetching audio for {} with {}", url, self.fetcher.name());
        tracing::debug!("Format selector {}, output template {}", selector, template.display());

        let fetched = self
            .fetcher
            .fetch(&url, &selector, &template)
            .await
            .map_err(|err| PipelineError::acquisition(&err))?;

        let path = resolve_output(fetched.path, slot)
            .ok_or_else(|| PipelineError::AcquisitionFailed("Downloaded audio file not found".to_string()))?;

        let format = AudioFormat::from_path(&path).ok_or_else(|| {
            PipelineError::AcquisitionFailed(format!("Unsupported audio container: {}", path.display()))
        })?;

        let title = fetched
            .title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        tracing::info!("Acquired {} audio for \"{}\"", format.as_str(), title);

        Ok(AudioArtifact { path, format, title })
    }
}

/// Prefer the path the fetcher reported, otherwise probe the slot for each
/// known extension in turn. Only files inside the slot are accepted.
fn resolve_output(reported: Option<PathBuf>, slot: &ScratchSlot) -> Option<PathBuf> {
    if let Some(path) = reported.filter(|path| slot.owns(path) && path.is_file()) {
        return Some(path);
    }

    AudioFormat::PROBE_ORDER
        .iter()
        .map(|format| slot.path_for(*format))
        .find(|candidate| candidate.is_file())
}
