//! Scratch directory for request-scoped artifacts.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::Result;
use crate::utils::fs::{ensure_dir_all, io_error, remove_file_if_exists};

/// Prefix shared by every artifact a combine job creates.
pub const ARTIFACT_PREFIX: &str = "output_";

/// Directory holding in-flight job files.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn ensure(&self) -> Result<()> {
        ensure_dir_all(&self.root).await
    }

    /// A fresh job stem: nanosecond timestamp plus a random suffix, so two
    /// jobs started in the same instant still get distinct paths.
    pub fn unique_stem(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}{}_{}", ARTIFACT_PREFIX, nanos, &suffix[..12])
    }

    pub fn output_path(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{}.mp4", stem))
    }

    pub fn fifo_path(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{}.audio.fifo", stem))
    }

    /// Remove artifacts left behind by a previous process.
    ///
    /// Only called at startup, before any job can own a path here.
    pub fn cleanup_stale(&self) -> Result<usize> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_error("reading directory", &self.root, e)),
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(ARTIFACT_PREFIX) {
                continue;
            }
            let path = entry.path();
            match remove_file_if_exists(&path) {
                Ok(true) => {
                    debug!(path = %path.display(), "Removed stale artifact");
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Failed to remove stale artifact"),
            }
        }

        if removed > 0 {
            info!(removed, dir = %self.root.display(), "Cleaned up stale scratch files");
        }
        Ok(removed)
    }
}
