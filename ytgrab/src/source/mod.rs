//! Remote video sources: metadata retrieval and elementary stream access.
//!
//! The pipeline only depends on the [`MetadataRetriever`] and [`StreamOpener`]
//! traits; [`YtDlpRetriever`] and [`HttpStreamOpener`] are the implementations
//! the binary wires up.

pub mod http;
pub mod ytdlp;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::Result;

pub use http::HttpStreamOpener;
pub use ytdlp::YtDlpRetriever;

/// An elementary byte stream arriving from a remote source.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// One encoding offered for a video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormatInfo {
    /// Format identifier (itag), as reported by the source.
    pub format_id: String,
    /// Container extension ("mp4", "webm", "m4a", ...).
    pub ext: String,
    /// Video codec, `None` for audio-only formats.
    pub vcodec: Option<String>,
    /// Audio codec, `None` for video-only formats.
    pub acodec: Option<String>,
    /// Reported content length in bytes.
    pub content_length: Option<u64>,
    /// Average audio bitrate in kbps.
    pub audio_bitrate_kbps: Option<f64>,
    /// Direct media URL.
    pub url: String,
    /// Headers the source expects on media requests.
    pub http_headers: HashMap<String, String>,
}

impl FormatInfo {
    pub fn has_video(&self) -> bool {
        self.vcodec.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.is_some()
    }

    /// Numeric identifier, when the source uses numeric itags.
    pub fn numeric_id(&self) -> Option<u32> {
        self.format_id.parse().ok()
    }
}

/// Metadata for one video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: u64,
    /// Formats carrying video in an MP4 container.
    pub video_formats: Vec<FormatInfo>,
    /// Formats carrying audio and no video.
    pub audio_formats: Vec<FormatInfo>,
}

impl VideoMetadata {
    /// Split a flat format list into the video and audio buckets.
    pub fn classify_formats(&mut self, formats: Vec<FormatInfo>) {
        for format in formats {
            if format.has_video() {
                if format.ext == "mp4" {
                    self.video_formats.push(format);
                }
            } else if format.has_audio() {
                self.audio_formats.push(format);
            }
        }
    }

    /// Look up an offered video format by identifier.
    pub fn video_format(&self, format_id: &str) -> Option<&FormatInfo> {
        self.video_formats.iter().find(|f| f.format_id == format_id)
    }

    /// The audio-only format with the highest bitrate.
    pub fn best_audio(&self) -> Option<&FormatInfo> {
        self.audio_formats.iter().max_by(|a, b| {
            let a = a.audio_bitrate_kbps.unwrap_or(0.0);
            let b = b.audio_bitrate_kbps.unwrap_or(0.0);
            a.total_cmp(&b)
        })
    }
}

/// Resolves a video id into metadata.
#[async_trait]
pub trait MetadataRetriever: Send + Sync {
    /// Metadata for the catalog view. Stream URLs may be absent.
    async fn get_basic_info(&self, id: &str) -> Result<VideoMetadata>;

    /// Metadata including everything needed to open the streams.
    async fn get_info(&self, id: &str) -> Result<VideoMetadata>;
}

/// Opens a byte stream for a chosen format.
#[async_trait]
pub trait StreamOpener: Send + Sync {
    async fn open_stream(&self, format: &FormatInfo) -> Result<ByteStream>;
}

/// Whether `id` has the shape of a video id.
///
/// Anything else is rejected before it reaches an external tool.
pub fn is_valid_video_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
