//! Pipeline integration tests
//!
//! The media-fetch service and the speech engine are replaced by fakes that
//! write into the scratch directory the way yt-dlp does, so every test can
//! check that nothing is left behind afterwards.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use quizscribe::extractors::{AudioArtifact, FetchedMedia, MediaAcquirer, MediaFetcher};
use quizscribe::transcribe::{SpeechEngine, Transcriber};
use quizscribe::{ErrorKind, PipelineError, PipelineSettings, TranscriptionPipeline};

const VIDEO_URL: &str = "https://youtu.be/TxHM390wrRk?si=abc";

fn output_path(template: &Path, ext: &str) -> PathBuf {
    PathBuf::from(template.to_string_lossy().replace("%(ext)s", ext))
}

/// Writes a finished audio file, like a successful yt-dlp run
struct WritingFetcher {
    ext: &'static str,
    title: Option<&'static str>,
    calls: AtomicUsize,
}

impl WritingFetcher {
    fn new(ext: &'static str, title: Option<&'static str>) -> Self {
        Self {
            ext,
            title,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MediaFetcher for WritingFetcher {
    async fn fetch(&self, _url: &str, _format_selector: &str, output_template: &Path) -> quizscribe::Result<FetchedMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output_path(output_template, self.ext), b"fake audio")?;
        Ok(FetchedMedia {
            title: self.title.map(str::to_string),
            path: None,
        })
    }

    fn name(&self) -> &'static str {
        "writing-fake"
    }
}

/// Leaves a partial download behind and then fails
struct FailingFetcher;

#[async_trait]
impl MediaFetcher for FailingFetcher {
    async fn fetch(&self, _url: &str, _format_selector: &str, output_template: &Path) -> quizscribe::Result<FetchedMedia> {
        std::fs::write(output_path(output_template, "m4a.part"), b"half")?;
        anyhow::bail!("ERROR: unable to download video data: HTTP Error 403: Forbidden")
    }

    fn name(&self) -> &'static str {
        "failing-fake"
    }
}

/// Succeeds without producing any file
struct EmptyFetcher;

#[async_trait]
impl MediaFetcher for EmptyFetcher {
    async fn fetch(&self, _url: &str, _format_selector: &str, _output_template: &Path) -> quizscribe::Result<FetchedMedia> {
        Ok(FetchedMedia::default())
    }

    fn name(&self) -> &'static str {
        "empty-fake"
    }
}

/// Starts writing and never finishes
struct StalledFetcher;

#[async_trait]
impl MediaFetcher for StalledFetcher {
    async fn fetch(&self, _url: &str, _format_selector: &str, output_template: &Path) -> quizscribe::Result<FetchedMedia> {
        std::fs::write(output_path(output_template, "webm.part"), b"half")?;
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(FetchedMedia::default())
    }

    fn name(&self) -> &'static str {
        "stalled-fake"
    }
}

/// Returns fixed text and remembers which files it was given
struct TextEngine {
    text: &'static str,
    seen: Mutex<Vec<PathBuf>>,
}

impl TextEngine {
    fn new(text: &'static str) -> Self {
        Self {
            text,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechEngine for TextEngine {
    async fn recognize(&self, audio: &AudioArtifact) -> quizscribe::Result<String> {
        assert!(audio.path.is_file(), "artifact must exist while transcribing");
        self.seen.lock().unwrap().push(audio.path.clone());
        Ok(self.text.to_string())
    }

    fn name(&self) -> &'static str {
        "text-fake"
    }
}

struct FailingEngine;

#[async_trait]
impl SpeechEngine for FailingEngine {
    async fn recognize(&self, _audio: &AudioArtifact) -> quizscribe::Result<String> {
        anyhow::bail!("corrupt audio stream")
    }

    fn name(&self) -> &'static str {
        "failing-fake"
    }
}

struct SlowEngine;

#[async_trait]
impl SpeechEngine for SlowEngine {
    async fn recognize(&self, _audio: &AudioArtifact) -> quizscribe::Result<String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("too late".to_string())
    }

    fn name(&self) -> &'static str {
        "slow-fake"
    }
}

fn pipeline(fetcher: Arc<dyn MediaFetcher>, engine: Arc<dyn SpeechEngine>, scratch_dir: &Path) -> TranscriptionPipeline {
    let settings = PipelineSettings {
        scratch_dir: scratch_dir.to_path_buf(),
        acquire_timeout: Duration::from_millis(300),
        transcribe_timeout: Duration::from_millis(300),
    };
    TranscriptionPipeline::new(
        MediaAcquirer::new(fetcher, vec!["bestaudio[ext=m4a]".into(), "bestaudio".into()]),
        Transcriber::new(engine),
        settings,
    )
}

fn leftovers(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn successful_run_returns_text_and_title_and_removes_audio() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(TextEngine::new("  Today we talk about ownership.\n"));
    let pipeline = pipeline(
        Arc::new(WritingFetcher::new("m4a", Some("Rust Ownership"))),
        engine.clone(),
        dir.path(),
    );

    let result = pipeline.run(VIDEO_URL).await.unwrap();

    assert_eq!(result.text, "Today we talk about ownership.");
    assert_eq!(result.title, "Rust Ownership");
    let seen = engine.seen();
    assert_eq!(seen.len(), 1);
    assert!(!seen[0].exists());
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn empty_transcript_is_success() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        Arc::new(WritingFetcher::new("webm", None)),
        Arc::new(TextEngine::new("")),
        dir.path(),
    );

    let result = pipeline.run(VIDEO_URL).await.unwrap();

    assert_eq!(result.text, "");
    assert_eq!(result.title, "Untitled Video");
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn invalid_url_fails_before_touching_the_fetcher() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("never-created");
    let fetcher = Arc::new(WritingFetcher::new("m4a", None));
    let pipeline = pipeline(fetcher.clone(), Arc::new(TextEngine::new("x")), &scratch);

    for input in ["", "   ", "https://www.youtube.com/watch?v=short", "https://vimeo.com/123456"] {
        let err = pipeline.run(input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidUrl, "input {:?}", input);
    }

    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    assert!(!scratch.exists());
}

#[tokio::test]
async fn download_error_leaves_no_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(Arc::new(FailingFetcher), Arc::new(TextEngine::new("x")), dir.path());

    let err = pipeline.run(VIDEO_URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AcquisitionFailed);
    assert!(err.cause().contains("HTTP Error 403"));
    assert_eq!(err.status_code(), 400);
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn missing_download_is_acquisition_failure() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(Arc::new(EmptyFetcher), Arc::new(TextEngine::new("x")), dir.path());

    let err = pipeline.run(VIDEO_URL).await.unwrap_err();

    assert_eq!(err, PipelineError::AcquisitionFailed("Downloaded audio file not found".to_string()));
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn engine_failure_is_transcription_failure_and_audio_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        Arc::new(WritingFetcher::new("m4a", Some("Lecture"))),
        Arc::new(FailingEngine),
        dir.path(),
    );

    let err = pipeline.run(VIDEO_URL).await.unwrap_err();

    assert_eq!(err, PipelineError::TranscriptionFailed("corrupt audio stream".to_string()));
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn acquisition_timeout_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(Arc::new(StalledFetcher), Arc::new(TextEngine::new("x")), dir.path());

    let err = pipeline.run(VIDEO_URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AcquisitionFailed);
    assert!(err.cause().starts_with("timed out"));
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn transcription_timeout_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        Arc::new(WritingFetcher::new("mp3", None)),
        Arc::new(SlowEngine),
        dir.path(),
    );

    let err = pipeline.run(VIDEO_URL).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TranscriptionFailed);
    assert!(err.cause().starts_with("timed out"));
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn cancellation_during_transcription_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    // Timeouts long enough that only the cancellation can end the stage
    let pipeline = TranscriptionPipeline::new(
        MediaAcquirer::new(Arc::new(WritingFetcher::new("m4a", None)), vec!["bestaudio".into()]),
        Transcriber::new(Arc::new(SlowEngine)),
        PipelineSettings {
            scratch_dir: dir.path().to_path_buf(),
            acquire_timeout: Duration::from_secs(60),
            transcribe_timeout: Duration::from_secs(60),
        },
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = pipeline
        .run_with_cancellation(VIDEO_URL, &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, PipelineError::TranscriptionFailed("cancelled".to_string()));
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn dropping_a_run_midway_still_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = TranscriptionPipeline::new(
        MediaAcquirer::new(Arc::new(StalledFetcher), vec!["bestaudio".into()]),
        Transcriber::new(Arc::new(TextEngine::new("x"))),
        PipelineSettings {
            scratch_dir: dir.path().to_path_buf(),
            acquire_timeout: Duration::from_secs(60),
            transcribe_timeout: Duration::from_secs(60),
        },
    );

    let abandoned = tokio::time::timeout(Duration::from_millis(100), pipeline.run(VIDEO_URL)).await;

    assert!(abandoned.is_err());
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn concurrent_runs_use_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(TextEngine::new("same video"));
    let pipeline = Arc::new(pipeline(
        Arc::new(WritingFetcher::new("m4a", Some("Shared"))),
        engine.clone(),
        dir.path(),
    ));

    let mut runs = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let pipeline = pipeline.clone();
        runs.spawn(async move { pipeline.run(VIDEO_URL).await });
    }

    while let Some(outcome) = runs.join_next().await {
        let result = outcome.unwrap().unwrap();
        assert_eq!(result.text, "same video");
    }

    let mut seen = engine.seen();
    assert_eq!(seen.len(), 8);
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 8, "every run must get its own scratch file");
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn equivalent_urls_reach_the_fetcher_identically() {
    struct UrlRecorder(Mutex<Vec<String>>);

    #[async_trait]
    impl MediaFetcher for UrlRecorder {
        async fn fetch(&self, url: &str, _format_selector: &str, output_template: &Path) -> quizscribe::Result<FetchedMedia> {
            self.0.lock().unwrap().push(url.to_string());
            std::fs::write(output_path(output_template, "m4a"), b"fake audio")?;
            Ok(FetchedMedia::default())
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(UrlRecorder(Mutex::new(Vec::new())));
    let pipeline = pipeline(recorder.clone(), Arc::new(TextEngine::new("x")), dir.path());

    for input in [
        "https://youtu.be/TxHM390wrRk?si=abc",
        "youtube.com/watch?v=TxHM390wrRk",
        "https://m.youtube.com/watch?v=TxHM390wrRk&t=123s&list=PLxxx",
    ] {
        pipeline.run(input).await.unwrap();
    }

    let urls = recorder.0.lock().unwrap().clone();
    assert!(urls.iter().all(|url| url == "https://www.youtube.com/watch?v=TxHM390wrRk"));
}
