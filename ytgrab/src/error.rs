//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::pipeline::CombineError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{entity_type} '{id}' not found")]
    NotFound { entity_type: String, id: String },

    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Quality '{0}' is not supported")]
    UnsupportedQuality(String),

    #[error("Bitrate '{0}' is not supported")]
    UnsupportedBitrate(String),

    #[error("Video is too long: {duration_secs}s exceeds the {limit_secs}s limit")]
    TooLong { duration_secs: u64, limit_secs: u64 },

    #[error("Combine failed: {0}")]
    Combine(#[from] CombineError),

    #[error("Metadata retrieval failed: {0}")]
    Retriever(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error while {op} '{}': {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}
