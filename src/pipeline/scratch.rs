use anyhow::Context;
use std::io;
use std::path::{Path, PathBuf};

use crate::extractors::AudioFormat;
use crate::utils;
use crate::Result;

/// A uniquely named place in the scratch directory for one pipeline run.
///
/// Every file the run writes starts with the slot's stem, so removing the
/// slot's files never touches another run's. Files still present when the
/// slot is dropped are removed on a best-effort basis.
#[derive(Debug)]
pub struct ScratchSlot {
    dir: PathBuf,
    stem: String,
    released: bool,
}

impl ScratchSlot {
    /// Reserve a new slot in `dir`, creating the directory if needed
    pub fn create(dir: &Path) -> Result<Self> {
        fs_err::create_dir_all(dir).context("Failed to create scratch directory")?;

        Ok(Self {
            dir: dir.to_path_buf(),
            stem: utils::unique_stem("audio"),
            released: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Output template in the syntax yt-dlp understands
    pub fn output_template(&self) -> PathBuf {
        self.dir.join(format!("{}.%(ext)s", self.stem))
    }

    pub fn path_for(&self, format: AudioFormat) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, format.as_str()))
    }

    /// Whether `path` names a file of this slot
    pub fn owns(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path())
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(&self.stem))
                .unwrap_or(false)
    }

    /// All files currently in the scratch directory that belong to this slot
    pub fn files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs_err::read_dir(&self.dir)? {
            let entry = entry?;
            let belongs = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(&self.stem))
                .unwrap_or(false);
            if belongs && entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    /// Delete every file of this slot and return how many were removed.
    ///
    /// A file that disappears between listing and removal is not an error.
    pub fn release(&mut self) -> io::Result<usize> {
        let mut removed = 0;
        for path in self.files()? {
            match fs_err::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!("Removed scratch file {}", path.display());
                    removed += 1;
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        self.released = true;
        Ok(removed)
    }
}

impl Drop for ScratchSlot {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.release() {
            tracing::warn!("Failed to clean up scratch files for {}: {}", self.stem, err);
        }
    }
}
