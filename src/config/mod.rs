use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extractors::default_formats;
use crate::pipeline::PipelineSettings;
use crate::transcribe::whisper;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Media-fetch service (yt-dlp) settings
    pub fetcher: FetcherConfig,

    /// Speech-to-text engine settings
    pub engine: EngineConfig,

    /// Scratch directory and timeouts
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// yt-dlp executable name or path
    pub binary: String,

    /// Format preference, most preferred first
    pub formats: Vec<String>,

    /// Extra arguments passed to every yt-dlp invocation
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// OpenAI-compatible Whisper HTTP API
    #[default]
    Whisper,
    /// AWS Transcribe (audio staged in S3)
    Aws,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Whisper => write!(f, "whisper"),
            Backend::Aws => write!(f, "aws"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: Backend,

    /// Language code for transcription (auto-detect if not specified)
    pub language: Option<String>,

    pub whisper: WhisperConfig,

    pub aws: AwsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    pub base_url: String,

    pub model: String,

    /// Environment variable holding the API key; unset means no auth header
    pub api_key_env: String,
}

impl WhisperConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    /// AWS region
    pub region: String,

    /// S3 bucket for temporary audio storage
    pub s3_bucket: String,

    /// Optional S3 key prefix
    pub s3_key_prefix: Option<String>,

    /// Initial delay between job status checks
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Scratch directory for downloads (system temp dir if not set)
    pub scratch_dir: Option<PathBuf>,

    pub acquire_timeout_secs: u64,

    pub transcribe_timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            formats: default_formats(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            base_url: whisper::DEFAULT_BASE_URL.to_string(),
            model: whisper::DEFAULT_MODEL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            s3_bucket: "".to_string(),
            s3_key_prefix: Some("quizscribe/".to_string()),
            poll_interval_secs: 5,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            acquire_timeout_secs: 600,
            transcribe_timeout_secs: 1800,
        }
    }
}

impl Config {
    /// Load configuration from an explicit file, or from the default location
    /// (writing a default file there on first use)
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save(&config_path).await?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            Ok(config)
        }
    }

    /// Read and validate a YAML configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("quizscribe").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.binary.trim().is_empty() {
            anyhow::bail!("fetcher.binary must not be empty");
        }

        if self.fetcher.formats.is_empty() {
            anyhow::bail!("fetcher.formats must list at least one format");
        }

        if self.pipeline.acquire_timeout_secs == 0 || self.pipeline.transcribe_timeout_secs == 0 {
            anyhow::bail!("Pipeline timeouts must be greater than zero");
        }

        match self.engine.backend {
            Backend::Whisper => {
                url::Url::parse(&self.engine.whisper.base_url)
                    .with_context(|| format!("Invalid whisper base_url: {}", self.engine.whisper.base_url))?;
            }
            Backend::Aws => {
                if self.engine.aws.s3_bucket.is_empty() {
                    anyhow::bail!("AWS S3 bucket must be configured for the aws backend");
                }
            }
        }

        Ok(())
    }

    /// Runtime settings for the pipeline
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            scratch_dir: self
                .pipeline
                .scratch_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            acquire_timeout: Duration::from_secs(self.pipeline.acquire_timeout_secs),
            transcribe_timeout: Duration::from_secs(self.pipeline.transcribe_timeout_secs),
        }
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  yt-dlp: {}", self.fetcher.binary);
        println!("  Formats: {}", self.fetcher.formats.join(" / "));
        println!("  Engine: {}", self.engine.backend);
        match self.engine.backend {
            Backend::Whisper => {
                println!("  Whisper URL: {}", self.engine.whisper.base_url);
                println!("  Whisper Model: {}", self.engine.whisper.model);
            }
            Backend::Aws => {
                println!("  AWS Region: {}", self.engine.aws.region);
                println!("  S3 Bucket: {}", self.engine.aws.s3_bucket);
                if let Some(prefix) = &self.engine.aws.s3_key_prefix {
                    println!("  S3 Prefix: {}", prefix);
                }
            }
        }
        if let Some(language) = &self.engine.language {
            println!("  Language: {}", language);
        }
        println!("  Scratch Dir: {}", self.pipeline_settings().scratch_dir.display());
        println!("  Acquire Timeout: {}s", self.pipeline.acquire_timeout_secs);
        println!("  Transcribe Timeout: {}s", self.pipeline.transcribe_timeout_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.backend, Backend::Whisper);
        assert_eq!(config.pipeline_settings().scratch_dir, std::env::temp_dir());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "engine:\n  backend: aws\n  aws:\n    s3_bucket: my-bucket\npipeline:\n  acquire_timeout_secs: 30\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.engine.backend, Backend::Aws);
        assert_eq!(config.engine.aws.s3_bucket, "my-bucket");
        assert_eq!(config.engine.aws.region, "us-east-1");
        assert_eq!(config.fetcher.binary, "yt-dlp");
        assert_eq!(config.pipeline_settings().acquire_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_aws_backend_requires_bucket() {
        let mut config = Config::default();
        config.engine.backend = Backend::Aws;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_formats_and_zero_timeouts() {
        let mut config = Config::default();
        config.fetcher.formats.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.transcribe_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "pipeline:\n  scratch_dir: /var/tmp/quizscribe\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.pipeline_settings().scratch_dir, PathBuf::from("/var/tmp/quizscribe"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.engine.language = Some("de".to_string());
        tokio_test::block_on(config.save(&path)).unwrap();

        let loaded = tokio_test::block_on(Config::load(Some(&path))).unwrap();
        assert_eq!(loaded.engine.language.as_deref(), Some("de"));
    }

    #[test]
    fn test_invalid_yaml_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "engine: [not, a, map]\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
