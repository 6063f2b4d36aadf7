use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quizscribe::cli::{Cli, Commands};
use quizscribe::config::Config;
use quizscribe::extractors::youtube;
use quizscribe::{output, utils, TranscriptResponse, TranscriptionPipeline};

/// How long to wait for remote cleanup of an abandoned run before exiting
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "quizscribe=debug" } else { "quizscribe=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Transcribe {
            url,
            output,
            format,
            backend,
            language,
            scratch_dir,
        } => {
            let mut config = Config::load(cli.config.as_deref()).await?;
            if let Some(backend) = backend {
                config.engine.backend = backend;
            }
            if language.is_some() {
                config.engine.language = language;
            }
            if scratch_dir.is_some() {
                config.pipeline.scratch_dir = scratch_dir;
            }

            // Check for required external dependencies (non-fatal in Docker)
            let missing_deps = utils::check_dependencies(&config.fetcher.binary).await;
            if !missing_deps.is_empty() {
                eprintln!("⚠️  Dependency check warnings:");
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - tools may be available)");
            }

            let pipeline = TranscriptionPipeline::from_config(&config)?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling");
                    on_interrupt.cancel();
                }
            });

            let progress = if cli.quiet {
                ProgressBar::hidden()
            } else {
                let progress = ProgressBar::new_spinner();
                progress.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
                progress.enable_steady_tick(Duration::from_millis(120));
                progress
            };
            progress.set_message("Downloading and transcribing...");

            let started = Instant::now();
            let result = pipeline.run_with_cancellation(&url, &cancel).await;
            if tokio::time::timeout(SHUTDOWN_GRACE, pipeline.shutdown()).await.is_err() {
                tracing::warn!("Gave up waiting for remote cleanup after {:?}", SHUTDOWN_GRACE);
            }

            match result {
                Ok(result) => {
                    progress.finish_with_message("Transcription complete");

                    let canonical = youtube::normalize(&url)
                        .map(|video| video.url())
                        .unwrap_or_else(|_| url.clone());
                    let response = TranscriptResponse::new(result, canonical);

                    match output {
                        Some(path) => {
                            output::save_to_file(&response, &path, &format).await?;
                            println!("Transcription saved to: {}", path.display());
                        }
                        None => output::print_to_console(&response, &format)?,
                    }

                    tracing::info!("Finished in {}", utils::format_duration(started.elapsed().as_secs_f64()));
                }
                Err(err) => {
                    progress.abandon_with_message("Failed");
                    eprintln!("Error: {}", err);
                    std::process::exit(err.exit_code());
                }
            }
        }
        Commands::Normalize { url } => match youtube::normalize(&url) {
            Ok(video) => println!("{}", video),
            Err(err) => {
                eprintln!("Error: {}", err);
                std::process::exit(err.exit_code());
            }
        },
        Commands::Config { show } => {
            let config = Config::load(cli.config.as_deref()).await?;
            if show {
                config.display();
            } else {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::config_path()?,
                };
                println!("Configuration file: {}", path.display());
                println!("Run with --show to print the current settings.");
            }
        }
        Commands::Check => {
            let config = Config::load(cli.config.as_deref()).await?;
            let missing = utils::check_dependencies(&config.fetcher.binary).await;
            if missing.is_empty() {
                println!("All external tools are available.");
            } else {
                for dep in &missing {
                    println!("missing: {}", dep);
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
