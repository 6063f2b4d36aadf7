use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{FetchedMedia, MediaFetcher};
use crate::Result;

const TITLE_MARKER: &str = "quizscribe-title:";
const FILE_MARKER: &str = "quizscribe-file:";

/// Media fetcher backed by the yt-dlp executable
pub struct YtDlpFetcher {
    yt_dlp_path: String,
    extra_args: Vec<String>,
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self::with_binary("yt-dlp", Vec::new())
    }

    pub fn with_binary(yt_dlp_path: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            extra_args,
        }
    }

    /// Arguments for a single download that also reports title and final path.
    ///
    /// The title is printed before the download starts, the path after all
    /// post-processing moved the file into place.
    fn build_args(&self, url: &str, format_selector: &str, output_template: &Path) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-simulate".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--format".to_string(),
            format_selector.to_string(),
            "--output".to_string(),
            output_template.to_string_lossy().into_owned(),
            "--print".to_string(),
            format!("video:{}%(title)s", TITLE_MARKER),
            "--print".to_string(),
            format!("after_move:{}%(filepath)s", FILE_MARKER),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.push(url.to_string());
        args
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, format_selector: &str, output_template: &Path) -> Result<FetchedMedia> {
        let args = self.build_args(url, format_selector, output_template);
        tracing::debug!("Running {} {}", self.yt_dlp_path, args.join(" "));

        // Dropping the future (timeout, cancellation) must not leave yt-dlp running
        let mut command = Command::new(&self.yt_dlp_path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command
            .spawn()
            .map_err(|err| anyhow::anyhow!("Failed to start {}: {}", self.yt_dlp_path, err))?;

        #[cfg(unix)]
        let group = ProcessGroupGuard::new(&child);

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| anyhow::anyhow!("Failed to wait for {}: {}", self.yt_dlp_path, err))?;

        #[cfg(unix)]
        group.disarm();

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp download failed: {}", error.trim());
        }

        Ok(parse_print_output(&String::from_utf8_lossy(&output.stdout)))
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Kills the whole process group of an abandoned yt-dlp run.
///
/// `kill_on_drop` only reaches yt-dlp itself; ffmpeg post-processors it
/// started share its group and would keep writing into the scratch slot.
#[cfg(unix)]
struct ProcessGroupGuard {
    pgid: Option<i32>,
}

#[cfg(unix)]
impl ProcessGroupGuard {
    fn new(child: &tokio::process::Child) -> Self {
        Self {
            pgid: child.id().and_then(|id| i32::try_from(id).ok()),
        }
    }

    fn disarm(mut self) {
        self.pgid = None;
    }
}

#[cfg(unix)]
impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pgid) = self.pgid.take() {
            tracing::debug!("Killing yt-dlp process group {}", pgid);
            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(err) => tracing::warn!("Failed to kill yt-dlp process group {}: {}", pgid, err),
            }
        }
    }
}

/// Pick title and final file path out of yt-dlp's `--print` lines
fn parse_print_output(stdout: &str) -> FetchedMedia {
    let mut media = FetchedMedia::default();
    for line in stdout.lines() {
        if let Some(title) = line.strip_prefix(TITLE_MARKER) {
            media.title = Some(title.to_string());
        } else if let Some(path) = line.strip_prefix(FILE_MARKER) {
            let path = path.trim();
            if !path.is_empty() && path != "NA" {
                media.path = Some(PathBuf::from(path));
            }
        }
    }
    media
}
