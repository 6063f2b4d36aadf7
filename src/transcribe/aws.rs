use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_transcribe::types::{LanguageCode, Media, MediaFormat, TranscriptionJob, TranscriptionJobStatus};
use aws_sdk_transcribe::Client as TranscribeClient;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tokio::time::sleep;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::SpeechEngine;
use crate::config::AwsConfig;
use crate::extractors::{AudioArtifact, AudioFormat};
use crate::utils;

/// Poll interval ceiling while waiting for a job
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// AWS Transcribe transcript format (only the parts we read)
#[derive(Debug, Deserialize)]
struct AwsTranscript {
    results: TranscriptResults,
}

#[derive(Debug, Deserialize)]
struct TranscriptResults {
    transcripts: Vec<TranscriptText>,
}

#[derive(Debug, Deserialize)]
struct TranscriptText {
    transcript: String,
}

struct AwsClients {
    s3: S3Client,
    transcribe: TranscribeClient,
}

/// Audio staged in S3 for one recognition.
///
/// Dropped without [`remove`](Self::remove), which happens when the
/// recognition future is abandoned on timeout or cancellation, it removes
/// the object and the transcription job from a task on `cleanup`.
struct StagedAudio {
    s3: S3Client,
    transcribe: TranscribeClient,
    bucket: String,
    key: String,
    job_name: Option<String>,
    cleanup: TaskTracker,
    released: bool,
}

impl StagedAudio {
    fn new(
        s3: S3Client,
        transcribe: TranscribeClient,
        bucket: impl Into<String>,
        key: impl Into<String>,
        cleanup: TaskTracker,
    ) -> Self {
        Self {
            s3,
            transcribe,
            bucket: bucket.into(),
            key: key.into(),
            job_name: None,
            cleanup,
            released: false,
        }
    }

    fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    /// Nothing was stored under the key after all
    fn forget(mut self) {
        self.released = true;
    }

    async fn remove(mut self) {
        self.released = true;
        if let Err(err) = delete_object(&self.s3, &self.bucket, &self.key).await {
            tracing::warn!("{:#}", err);
        }
    }
}

impl Drop for StagedAudio {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime left to remove {}", self.uri());
            return;
        };
        tracing::warn!("Recognition abandoned, removing {}", self.uri());

        let s3 = self.s3.clone();
        let transcribe = self.transcribe.clone();
        let bucket = std::mem::take(&mut self.bucket);
        let key = std::mem::take(&mut self.key);
        let job_name = self.job_name.take();

        self.cleanup.spawn_on(
            async move {
                if let Some(job_name) = job_name {
                    if let Err(err) = transcribe
                        .delete_transcription_job()
                        .transcription_job_name(&job_name)
                        .send()
                        .await
                    {
                        tracing::warn!("Failed to delete transcription job {}: {}", job_name, err);
                    }
                }
                if let Err(err) = delete_object(&s3, &bucket, &key).await {
                    tracing::warn!("{:#}", err);
                }
            },
            &runtime,
        );
    }
}

/// Speech engine backed by AWS Transcribe.
///
/// Audio is staged in S3 for the duration of one job. SDK clients are built
/// on first use, exactly once, and shared by all later recognitions.
pub struct AwsTranscribeEngine {
    config: AwsConfig,
    language: Option<String>,
    clients: OnceCell<AwsClients>,
    http: reqwest::Client,
    cleanup: TaskTracker,
}

impl AwsTranscribeEngine {
    pub fn new(config: AwsConfig, language: Option<String>) -> Self {
        Self {
            config,
            language,
            clients: OnceCell::new(),
            http: reqwest::Client::new(),
            cleanup: TaskTracker::new(),
        }
    }

    async fn clients(&self) -> &AwsClients {
        self.clients
            .get_or_init(|| async {
                tracing::info!("Loading AWS configuration for region {}", self.config.region);
                let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(aws_config::Region::new(self.config.region.clone()))
                    .load()
                    .await;

                AwsClients {
                    s3: S3Client::new(&aws_config),
                    transcribe: TranscribeClient::new(&aws_config),
                }
            })
            .await
    }

    /// Upload audio file to S3
    async fn upload(&self, clients: &AwsClients, audio: &AudioArtifact) -> Result<StagedAudio> {
        let key = object_key(self.config.s3_key_prefix.as_deref(), audio.format);
        let content = fs_err::tokio::read(&audio.path).await?;

        let staged = StagedAudio::new(
            clients.s3.clone(),
            clients.transcribe.clone(),
            &self.config.s3_bucket,
            key,
            self.cleanup.clone(),
        );
        tracing::info!("Uploading audio to S3: {}", staged.uri());

        let uploaded = clients
            .s3
            .put_object()
            .bucket(&staged.bucket)
            .key(&staged.key)
            .body(content.into())
            .content_type(audio.format.mime_type())
            .send()
            .await;

        if let Err(err) = uploaded {
            staged.forget();
            return Err(err).context("Failed to upload audio to S3");
        }

        Ok(staged)
    }

    async fn start_job(&self, clients: &AwsClients, staged: &StagedAudio, format: AudioFormat) -> Result<String> {
        let job_name = format!("quizscribe_{}", Uuid::new_v4());
        tracing::info!("Starting transcription job: {}", job_name);

        let mut job = clients
            .transcribe
            .start_transcription_job()
            .transcription_job_name(&job_name)
            .media_format(media_format(format))
            .media(Media::builder().media_file_uri(staged.uri()).build());

        job = match &self.language {
            Some(language) => job.language_code(language_code(language)),
            None => job.identify_language(true),
        };

        job.send().await.context("Failed to start transcription job")?;
        Ok(job_name)
    }

    async fn get_job(&self, clients: &AwsClients, job_name: &str) -> Result<TranscriptionJob> {
        let response = clients
            .transcribe
            .get_transcription_job()
            .transcription_job_name(job_name)
            .send()
            .await
            .context("Failed to get transcription job status")?;

        response
            .transcription_job()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Transcription job not found"))
    }

    /// Poll with a growing interval until the job settles
    async fn wait_for_job(&self, clients: &AwsClients, job_name: &str) -> Result<TranscriptionJob> {
        let started = Instant::now();
        let base = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let mut check_count: u32 = 0;

        loop {
            check_count += 1;
            let job = self.get_job(clients, job_name).await?;

            match job.transcription_job_status() {
                Some(TranscriptionJobStatus::Queued) | Some(TranscriptionJobStatus::InProgress) => {
                    tracing::debug!(
                        "Job {} still running ({}s elapsed, check #{})",
                        job_name,
                        started.elapsed().as_secs(),
                        check_count
                    );
                    let wait = (base + Duration::from_secs(2) * (check_count - 1)).min(MAX_POLL_INTERVAL);
                    sleep(wait).await;
                }
                Some(TranscriptionJobStatus::Completed) => return Ok(job),
                Some(TranscriptionJobStatus::Failed) => {
                    let reason = job.failure_reason().unwrap_or("Unknown error");
                    anyhow::bail!("Transcription job failed: {}", reason);
                }
                _ => anyhow::bail!("Unexpected transcription job status"),
            }
        }
    }

    async fn download_transcript(&self, job: &TranscriptionJob) -> Result<String> {
        let uri = job
            .transcript()
            .and_then(|t| t.transcript_file_uri())
            .ok_or_else(|| anyhow::anyhow!("No transcript URI found"))?;

        let response = self.http.get(uri).send().await.context("Failed to download transcript")?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to download transcript: HTTP {}", response.status());
        }

        let body = response.text().await.context("Failed to read transcript content")?;
        parse_transcript(&body)
    }

    async fn transcribe_staged(
        &self,
        clients: &AwsClients,
        staged: &mut StagedAudio,
        format: AudioFormat,
    ) -> Result<String> {
        let job_name = self.start_job(clients, staged, format).await?;
        staged.job_name = Some(job_name.clone());

        let job = self.wait_for_job(clients, &job_name).await?;
        self.download_transcript(&job).await
    }
}

#[async_trait]
impl SpeechEngine for AwsTranscribeEngine {
    async fn recognize(&self, audio: &AudioArtifact) -> Result<String> {
        let clients = self.clients().await;
        let mut staged = self.upload(clients, audio).await?;

        let outcome = self.transcribe_staged(clients, &mut staged, audio.format).await;

        // The staged object goes away whatever the job did
        staged.remove().await;

        outcome
    }

    /// Wait for removals of staged audio from abandoned recognitions
    async fn shutdown(&self) {
        self.cleanup.close();
        self.cleanup.wait().await;
    }

    fn name(&self) -> &'static str {
        "aws-transcribe"
    }
}

async fn delete_object(s3: &S3Client, bucket: &str, key: &str) -> Result<()> {
    tracing::debug!("Cleaning up S3 object: s3://{}/{}", bucket, key);

    s3.delete_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .context("Failed to clean up S3 object")?;

    Ok(())
}

fn object_key(prefix: Option<&str>, format: AudioFormat) -> String {
    format!(
        "{}audio_{}_{}.{}",
        prefix.unwrap_or(""),
        Uuid::new_v4().simple(),
        chrono::Utc::now().format("%Y%m%d_%H%M%S"),
        format.as_str()
    )
}

fn language_code(language: &str) -> LanguageCode {
    LanguageCode::from(utils::normalize_language_code(language).as_str())
}

fn media_format(format: AudioFormat) -> MediaFormat {
    match format {
        AudioFormat::Mp3 => MediaFormat::Mp3,
        AudioFormat::M4a | AudioFormat::Mp4 => MediaFormat::Mp4,
        AudioFormat::Wav => MediaFormat::Wav,
        AudioFormat::Flac => MediaFormat::Flac,
        AudioFormat::Ogg | AudioFormat::Opus => MediaFormat::Ogg,
        AudioFormat::Webm => MediaFormat::Webm,
    }
}

fn parse_transcript(body: &str) -> Result<String> {
    let transcript: AwsTranscript = serde_json::from_str(body).context("Failed to parse transcript JSON")?;

    Ok(transcript
        .results
        .transcripts
        .into_iter()
        .next()
        .map(|t| t.transcript)
        .unwrap_or_default())
}
