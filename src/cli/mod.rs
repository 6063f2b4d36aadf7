use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Backend;

#[derive(Parser)]
#[command(
    name = "quizscribe",
    about = "quizscribe - Turn YouTube videos into transcripts for quiz generation",
    version,
    long_about = "Downloads the audio track of a YouTube video with yt-dlp and transcribes it with a Whisper-compatible API or AWS Transcribe. Temporary audio files are always removed."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to ./config.yaml or the user config dir)
    #[arg(short, long, global = true, env = "QUIZSCRIBE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download and transcribe a video
    Transcribe {
        /// YouTube URL (youtube.com, m.youtube.com or youtu.be)
        #[arg(value_name = "URL")]
        url: String,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Speech-to-text backend (overrides the config file)
        #[arg(long, value_enum)]
        backend: Option<Backend>,

        /// Language code for transcription (auto-detect if not specified)
        #[arg(short, long, value_name = "LANG")]
        language: Option<String>,

        /// Directory for temporary audio files
        #[arg(long, value_name = "DIR")]
        scratch_dir: Option<PathBuf>,
    },

    /// Print the canonical form of a video URL
    Normalize {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Check that yt-dlp and ffmpeg are installed
    Check,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// Title followed by the transcript
    Text,
    /// JSON object with transcript, video_title and url
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
