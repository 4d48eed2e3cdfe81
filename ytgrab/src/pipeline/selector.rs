//! Request validation and stream selection.
//!
//! Checks run cheapest first: parameter presence and the allow-list are
//! decided locally, before the retriever is contacted.

use std::sync::Arc;

use tracing::debug;

use super::combiner::AudioCodecPolicy;
use crate::catalog::CatalogConfig;
use crate::source::{FormatInfo, MetadataRetriever, VideoMetadata, is_valid_video_id};
use crate::{Error, Result};

/// Streams chosen for an MP4 download.
#[derive(Debug, Clone)]
pub struct VideoPlan {
    pub title: String,
    pub video: FormatInfo,
    pub audio: FormatInfo,
}

impl VideoPlan {
    pub fn audio_policy(&self) -> AudioCodecPolicy {
        AudioCodecPolicy::for_codec(self.audio.acodec.as_deref())
    }
}

/// Stream chosen for an MP3 download.
#[derive(Debug, Clone)]
pub struct AudioPlan {
    pub title: String,
    pub audio: FormatInfo,
    pub bitrate_kbps: u32,
}

/// Validates download requests against the catalog and the admission policy.
#[derive(Clone)]
pub struct StreamSelector {
    retriever: Arc<dyn MetadataRetriever>,
    catalog: CatalogConfig,
    max_duration_secs: u64,
}

impl StreamSelector {
    pub fn new(
        retriever: Arc<dyn MetadataRetriever>,
        catalog: CatalogConfig,
        max_duration_secs: u64,
    ) -> Self {
        Self {
            retriever,
            catalog,
            max_duration_secs,
        }
    }

    /// Pick the video format for `quality` plus the best audio-only format.
    pub async fn select_video(&self, id: &str, quality: Option<&str>) -> Result<VideoPlan> {
        let raw = required(quality, "quality")?;
        let itag = raw
            .parse::<u32>()
            .ok()
            .filter(|itag| self.catalog.supports_video(*itag))
            .ok_or_else(|| Error::UnsupportedQuality(raw.to_string()))?;

        let metadata = self.resolve(id).await?;

        let video = metadata
            .video_format(&itag.to_string())
            .cloned()
            .ok_or_else(|| Error::not_found("Quality", itag.to_string()))?;

        self.admit(&metadata)?;

        let audio = best_audio(&metadata)?;
        debug!(
            video_id = %id,
            video_format = %video.format_id,
            audio_format = %audio.format_id,
            "Selected streams for video download"
        );

        Ok(VideoPlan {
            title: metadata.title,
            video,
            audio,
        })
    }

    /// Pick the best audio-only format to transcode at `bitrate`.
    pub async fn select_audio(&self, id: &str, bitrate: Option<&str>) -> Result<AudioPlan> {
        let raw = required(bitrate, "bitrate")?;
        let bitrate_kbps = raw
            .parse::<u32>()
            .ok()
            .filter(|kbps| self.catalog.supports_bitrate(*kbps))
            .ok_or_else(|| Error::UnsupportedBitrate(raw.to_string()))?;

        let metadata = self.resolve(id).await?;
        self.admit(&metadata)?;

        let audio = best_audio(&metadata)?;
        debug!(
            video_id = %id,
            audio_format = %audio.format_id,
            bitrate_kbps,
            "Selected stream for audio download"
        );

        Ok(AudioPlan {
            title: metadata.title,
            audio,
            bitrate_kbps,
        })
    }

    async fn resolve(&self, id: &str) -> Result<VideoMetadata> {
        if !is_valid_video_id(id) {
            return Err(Error::not_found("Video", id));
        }
        self.retriever.get_info(id).await
    }

    fn admit(&self, metadata: &VideoMetadata) -> Result<()> {
        if metadata.duration_seconds > self.max_duration_secs {
            return Err(Error::TooLong {
                duration_secs: metadata.duration_seconds,
                limit_secs: self.max_duration_secs,
            });
        }
        Ok(())
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(Error::MissingParameter(name))
}

fn best_audio(metadata: &VideoMetadata) -> Result<FormatInfo> {
    metadata
        .best_audio()
        .cloned()
        .ok_or_else(|| Error::not_found("Audio stream", &metadata.id))
}
