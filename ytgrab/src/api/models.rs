//! API response models.
//!
//! Field names follow the contract existing clients were built against,
//! including the `duraction` spelling.

use serde::Serialize;

use crate::catalog::{Catalog, QualityOption};
use crate::source::VideoMetadata;

const BYTES_PER_MIB: f64 = 1_048_576.0;

/// One entry of `mp4Qualities` / `mp3Qualities`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityOptionResponse {
    pub itag: u32,
    pub quality: String,
    pub estimated_size_bytes: Option<u64>,
    /// Estimated size in MiB.
    pub file_size: Option<f64>,
}

impl From<QualityOption> for QualityOptionResponse {
    fn from(option: QualityOption) -> Self {
        Self {
            itag: option.id,
            quality: option.label,
            estimated_size_bytes: option.estimated_size_bytes,
            file_size: option
                .estimated_size_bytes
                .map(|bytes| bytes as f64 / BYTES_PER_MIB),
        }
    }
}

/// Body of `GET /info/{id}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfoResponse {
    pub title: String,
    pub thumbnail: Option<String>,
    /// Duration in seconds, as text.
    pub duraction: String,
    pub mp4_qualities: Vec<QualityOptionResponse>,
    pub mp3_qualities: Vec<QualityOptionResponse>,
}

impl VideoInfoResponse {
    pub fn new(metadata: VideoMetadata, catalog: Catalog) -> Self {
        Self {
            title: metadata.title,
            thumbnail: metadata.thumbnail_url,
            duraction: metadata.duration_seconds.to_string(),
            mp4_qualities: catalog.video_options.into_iter().map(Into::into).collect(),
            mp3_qualities: catalog.audio_options.into_iter().map(Into::into).collect(),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// First line of `ffmpeg -version`, if the muxer could be run.
    pub muxer: Option<String>,
}
