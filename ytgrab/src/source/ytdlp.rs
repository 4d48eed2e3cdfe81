//! Metadata retriever backed by the `yt-dlp` executable.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use process_utils::{ExitReport, tokio_command};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{FormatInfo, MetadataRetriever, VideoMetadata, is_valid_video_id};
use crate::config::DEFAULT_METADATA_TIMEOUT_SECS;
use crate::{Error, Result};

/// Raw `--dump-single-json` document; only the fields we read.
#[derive(Debug, Deserialize)]
struct RawVideo {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<RawThumbnail>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawThumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    #[serde(default)]
    ext: String,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    filesize_approx: Option<u64>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

/// yt-dlp reports a missing track as the literal codec "none".
fn codec(value: Option<String>) -> Option<String> {
    value.filter(|c| !c.is_empty() && c != "none")
}

impl From<RawFormat> for FormatInfo {
    fn from(raw: RawFormat) -> Self {
        Self {
            format_id: raw.format_id,
            ext: raw.ext,
            vcodec: codec(raw.vcodec),
            acodec: codec(raw.acodec),
            content_length: raw.filesize.or(raw.filesize_approx),
            audio_bitrate_kbps: raw.abr,
            url: raw.url.unwrap_or_default(),
            http_headers: raw.http_headers,
        }
    }
}

/// Parse a `--dump-single-json` document into [`VideoMetadata`].
pub fn parse_metadata(json: &[u8]) -> Result<VideoMetadata> {
    let raw: RawVideo = serde_json::from_slice(json)?;

    // The last listed thumbnail is the largest one.
    let thumbnail_url = raw
        .thumbnails
        .into_iter()
        .next_back()
        .map(|t| t.url)
        .or(raw.thumbnail);

    let mut metadata = VideoMetadata {
        id: raw.id,
        title: raw.title,
        thumbnail_url,
        duration_seconds: raw.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
        video_formats: Vec::new(),
        audio_formats: Vec::new(),
    };
    metadata.classify_formats(
        raw.formats
            .into_iter()
            .map(FormatInfo::from)
            .filter(|f| !f.url.is_empty())
            .collect(),
    );

    Ok(metadata)
}

/// Retriever that shells out to yt-dlp.
pub struct YtDlpRetriever {
    /// Path to the yt-dlp binary.
    binary_path: String,
    /// Upper bound on one lookup.
    timeout: Duration,
}

impl YtDlpRetriever {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            timeout: Duration::from_secs(DEFAULT_METADATA_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_args(id: &str) -> Vec<String> {
        vec![
            "--dump-single-json".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--skip-download".to_string(),
            "--socket-timeout".to_string(),
            "15".to_string(),
            format!("https://www.youtube.com/watch?v={}", id),
        ]
    }

    async fn fetch(&self, id: &str) -> Result<VideoMetadata> {
        if !is_valid_video_id(id) {
            return Err(Error::not_found("Video", id));
        }

        let started = Instant::now();
        let child = tokio_command(&self.binary_path)
            .args(Self::build_args(id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Retriever(format!("Failed to spawn yt-dlp: {}", e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Retriever(format!(
                    "yt-dlp timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Retriever(format!("Failed to run yt-dlp: {}", e)))?;

        let report = ExitReport::from(output.status);
        if !report.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(video_id = %id, %report, stderr = %stderr.trim(), "yt-dlp could not resolve video");
            return Err(Error::not_found("Video", id));
        }

        let metadata = parse_metadata(&output.stdout).map_err(|e| {
            warn!(video_id = %id, error = %e, "yt-dlp returned unreadable metadata");
            Error::Retriever(format!("Unreadable yt-dlp output: {}", e))
        })?;

        info!(
            video_id = %id,
            video_formats = metadata.video_formats.len(),
            audio_formats = metadata.audio_formats.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Resolved video metadata"
        );
        Ok(metadata)
    }
}

#[async_trait]
impl MetadataRetriever for YtDlpRetriever {
    async fn get_basic_info(&self, id: &str) -> Result<VideoMetadata> {
        self.fetch(id).await
    }

    async fn get_info(&self, id: &str) -> Result<VideoMetadata> {
        self.fetch(id).await
    }
}
