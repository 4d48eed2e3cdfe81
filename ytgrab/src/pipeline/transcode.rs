//! Audio-only transcoding to MP3, streamed straight through ffmpeg.

use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use process_utils::{ExitReport, tokio_command};
use tokio::process::{ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};

use super::forward::{ForwardOutcome, forward};
use crate::source::ByteStream;
use crate::{Error, Result};

/// Encodes a byte stream to MP3 without touching disk.
#[derive(Debug, Clone)]
pub struct AudioTranscoder {
    ffmpeg_path: String,
}

impl AudioTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn build_args(bitrate_kbps: u32) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];
        args.extend(["-i".to_string(), "pipe:0".to_string()]);
        args.push("-vn".to_string());
        args.extend(["-c:a".to_string(), "libmp3lame".to_string()]);
        args.extend(["-b:a".to_string(), format!("{}k", bitrate_kbps)]);
        args.extend(["-f".to_string(), "mp3".to_string()]);
        args.push("pipe:1".to_string());
        args
    }

    fn command(&self, bitrate_kbps: u32) -> Command {
        let mut cmd = tokio_command(&self.ffmpeg_path);
        cmd.args(Self::build_args(bitrate_kbps))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }

    /// Start encoding `source` at `bitrate_kbps`.
    ///
    /// The returned stream ends with an error if the source fails or the
    /// encoder exits unsuccessfully. Dropping it kills the encoder.
    pub fn transcode(&self, source: ByteStream, bitrate_kbps: u32) -> Result<TranscodeStream> {
        let mut child = self
            .command(bitrate_kbps)
            .spawn()
            .map_err(|e| Error::Other(format!("Failed to start audio encoder: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Other("encoder stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Other("encoder stdout not captured".to_string()))?;

        let (failures_tx, failures) = mpsc::channel(2);

        let feeder_tx = failures_tx.clone();
        let feeder = AbortOnDropHandle::new(tokio::spawn(async move {
            let mut stdin = stdin;
            if let ForwardOutcome::SourceFailed { error, .. } =
                forward(source, &mut stdin, "audio").await
            {
                let _ = feeder_tx.send(error).await;
            }
        }));

        // Owns the child: aborting this task drops it, which kills the encoder.
        let supervisor = AbortOnDropHandle::new(tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => {
                    let exit = ExitReport::from(status);
                    if exit.success() {
                        debug!(bitrate_kbps, "Audio encoder finished");
                    } else {
                        warn!(bitrate_kbps, %exit, "Audio encoder failed");
                        let _ = failures_tx
                            .send(io::Error::other(format!("audio encoder failed with {}", exit)))
                            .await;
                    }
                }
                Err(e) => {
                    let _ = failures_tx.send(e).await;
                }
            }
        }));

        Ok(TranscodeStream {
            stdout: ReaderStream::new(stdout),
            failures,
            stdout_done: false,
            done: false,
            _feeder: feeder,
            _supervisor: supervisor,
        })
    }
}

/// MP3 bytes as the encoder produces them.
pub struct TranscodeStream {
    stdout: ReaderStream<ChildStdout>,
    failures: mpsc::Receiver<io::Error>,
    stdout_done: bool,
    done: bool,
    _feeder: AbortOnDropHandle<()>,
    _supervisor: AbortOnDropHandle<()>,
}

impl Stream for TranscodeStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        if let Poll::Ready(Some(error)) = self.failures.poll_recv(cx) {
            self.done = true;
            return Poll::Ready(Some(Err(error)));
        }

        if !self.stdout_done {
            match Pin::new(&mut self.stdout).poll_next(cx) {
                Poll::Ready(None) => self.stdout_done = true,
                other => return other,
            }
        }

        // Output is complete; the stream ends once every reporter is done.
        match self.failures.poll_recv(cx) {
            Poll::Ready(Some(error)) => {
                self.done = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
