//! Quality catalog: the user-facing list of downloadable qualities.
//!
//! The allow-list, the preference order and the audio bitrates are plain data
//! in [`CatalogConfig`]; the builder never reaches for globals.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::source::VideoMetadata;

/// One downloadable quality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityOption {
    /// Format identifier (video) or bitrate in kbps (audio).
    pub id: u32,
    /// Human-readable label, e.g. "720p" or "128kbps".
    pub label: String,
    /// Estimated output size. For audio this is derived from the duration and
    /// is never authoritative.
    pub estimated_size_bytes: Option<u64>,
}

/// Catalog produced for one video.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub video_options: Vec<QualityOption>,
    pub audio_options: Vec<QualityOption>,
}

/// Immutable catalog configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Supported video format identifiers and their labels.
    pub video_labels: Vec<(u32, String)>,
    /// Video identifiers in preference order (best first).
    pub video_preference: Vec<u32>,
    /// Offered audio bitrates in kbps, in display order.
    pub audio_bitrates: Vec<u32>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            video_labels: vec![
                (137, "1080p".to_string()),
                (136, "720p".to_string()),
                (135, "480p".to_string()),
                (18, "360p".to_string()),
                (160, "144p".to_string()),
            ],
            video_preference: vec![137, 136, 135, 18, 160],
            audio_bitrates: vec![320, 256, 192, 128, 64],
        }
    }
}

impl CatalogConfig {
    /// Label for a supported video identifier.
    pub fn video_label(&self, id: u32) -> Option<&str> {
        self.video_labels
            .iter()
            .find(|(known, _)| *known == id)
            .map(|(_, label)| label.as_str())
    }

    pub fn supports_video(&self, id: u32) -> bool {
        self.video_label(id).is_some()
    }

    pub fn supports_bitrate(&self, kbps: u32) -> bool {
        self.audio_bitrates.contains(&kbps)
    }

    /// Position in the preference list; unknown identifiers rank last.
    fn preference_rank(&self, id: u32) -> usize {
        self.video_preference
            .iter()
            .position(|p| *p == id)
            .unwrap_or(usize::MAX)
    }
}

/// Label used for an audio bitrate.
pub fn bitrate_label(kbps: u32) -> String {
    format!("{}kbps", kbps)
}

/// Estimated size in bytes of `duration_secs` of audio at `kbps`.
pub fn estimate_audio_size(duration_secs: u64, kbps: u32) -> u64 {
    duration_secs * u64::from(kbps) * 1000 / 8
}

/// Builds catalogs from video metadata.
#[derive(Debug, Clone, Default)]
pub struct CatalogBuilder {
    config: CatalogConfig,
}

impl CatalogBuilder {
    pub fn new(config: CatalogConfig) -> Self {
        Self { config }
    }

    /// Build the catalog for one video.
    pub fn build(&self, metadata: &VideoMetadata) -> Catalog {
        Catalog {
            video_options: self.video_options(metadata),
            audio_options: self.audio_options(metadata.duration_seconds),
        }
    }

    fn video_options(&self, metadata: &VideoMetadata) -> Vec<QualityOption> {
        let mut seen = HashSet::new();
        let mut options: Vec<QualityOption> = metadata
            .video_formats
            .iter()
            .filter_map(|format| {
                let id = format.numeric_id()?;
                let label = self.config.video_label(id)?;
                seen.insert(id).then(|| QualityOption {
                    id,
                    label: label.to_string(),
                    estimated_size_bytes: format.content_length,
                })
            })
            .collect();

        // Stable sort keeps encounter order among equally ranked entries.
        options.sort_by_key(|option| self.config.preference_rank(option.id));
        options
    }

    fn audio_options(&self, duration_secs: u64) -> Vec<QualityOption> {
        self.config
            .audio_bitrates
            .iter()
            .map(|&kbps| QualityOption {
                id: kbps,
                label: bitrate_label(kbps),
                estimated_size_bytes: Some(estimate_audio_size(duration_secs, kbps)),
            })
            .collect()
    }
}
