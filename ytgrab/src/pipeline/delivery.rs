//! Delivery of finished files and the cleanup guarantee around them.
//!
//! Every on-disk artifact is owned by a [`TempFile`]. Whoever holds the
//! guard last decides when the file disappears: the combiner on failure, or
//! the [`DeliveryStream`] once the response body is finished or abandoned.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::combiner::CombinedFile;
use crate::Result;
use crate::utils::fs::{io_error, remove_file_if_exists};

/// Read size when streaming a finished file.
const DELIVERY_CHUNK_SIZE: usize = 64 * 1024;

/// Owns a path and removes it exactly once, on [`TempFile::remove`] or drop.
///
/// Removal is a blocking `unlink`, also when dropped on a runtime worker.
/// It is a single metadata call on the local scratch directory, and a drop
/// may run where no runtime is left to spawn a blocking task on.
#[derive(Debug)]
pub struct TempFile {
    path: Option<PathBuf>,
}

impl TempFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// The guarded path. Empty once the file has been removed.
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Remove the file now. Later calls and the drop are no-ops.
    pub fn remove(&mut self) -> bool {
        let Some(path) = self.path.take() else {
            return false;
        };
        match remove_file_if_exists(&path) {
            Ok(removed) => {
                debug!(path = %path.display(), removed, "Released temp file");
                removed
            }
            Err(e) => {
                warn!(error = %e, "Failed to remove temp file");
                false
            }
        }
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Byte stream over a finished file that deletes it when dropped.
pub struct DeliveryStream {
    reader: ReaderStream<File>,
    _file: TempFile,
}

impl Stream for DeliveryStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.reader).poll_next(cx)
    }
}

/// A file ready to be sent.
pub struct Delivery {
    pub content_length: u64,
    pub stream: DeliveryStream,
}

/// Open a combined file for streaming.
///
/// If the file cannot be opened it is removed before the error is returned.
pub async fn deliver(combined: CombinedFile) -> Result<Delivery> {
    let CombinedFile { file: guard, size } = combined;
    let handle = File::open(guard.path())
        .await
        .map_err(|e| io_error("opening", guard.path(), e))?;

    debug!(path = %guard.path().display(), size, "Delivering combined file");
    Ok(Delivery {
        content_length: size,
        stream: DeliveryStream {
            reader: ReaderStream::with_capacity(handle, DELIVERY_CHUNK_SIZE),
            _file: guard,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn combined(dir: &Path, contents: &[u8]) -> CombinedFile {
        let path = dir.join("output_test.mp4");
        std::fs::write(&path, contents).unwrap();
        CombinedFile {
            file: TempFile::new(path),
            size: contents.len() as u64,
        }
    }

    #[test]
    fn test_temp_file_removed_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"x").unwrap();

        let mut guard = TempFile::new(&path);
        assert!(guard.remove());
        assert!(!path.exists());

        // Recreated by someone else: the spent guard must not touch it.
        std::fs::write(&path, b"y").unwrap();
        assert!(!guard.remove());
        drop(guard);
        assert!(path.exists());
    }

    #[test]
    fn test_temp_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"x").unwrap();
        drop(TempFile::new(&path));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_full_delivery_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = combined(dir.path(), b"combined-bytes");
        let path = file.file.path().to_path_buf();

        let delivery = deliver(file).await.unwrap();
        assert_eq!(delivery.content_length, 14);
        assert!(path.exists());

        let chunks: Vec<Bytes> = delivery
            .stream
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), b"combined-bytes");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_aborted_delivery_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = combined(dir.path(), &vec![7u8; DELIVERY_CHUNK_SIZE * 3]);
        let path = file.file.path().to_path_buf();

        let mut delivery = deliver(file).await.unwrap();
        let first = delivery.stream.next().await.unwrap().unwrap();
        assert!(!first.is_empty());
        assert!(path.exists());

        drop(delivery);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_deliver_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = CombinedFile {
            file: TempFile::new(dir.path().join("gone.mp4")),
            size: 0,
        };
        assert!(deliver(file).await.is_err());
    }
}
