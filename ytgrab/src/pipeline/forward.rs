//! Byte forwarding from a source stream into a process input.

use std::io;
use std::path::Path;
#[cfg(unix)]
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::source::ByteStream;

/// How often to retry opening a FIFO whose reader has not shown up yet.
#[cfg(unix)]
const FIFO_OPEN_POLL: Duration = Duration::from_millis(20);

/// How a forwarder ended.
#[derive(Debug)]
pub enum ForwardOutcome {
    /// The source ended and the sink was closed cleanly.
    Completed { bytes: u64 },
    /// The process stopped reading. Not a failure by itself.
    SinkClosed { bytes: u64, error: io::Error },
    /// The source stream failed.
    SourceFailed { bytes: u64, error: io::Error },
}

impl ForwardOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Completed { bytes }
            | Self::SinkClosed { bytes, .. }
            | Self::SourceFailed { bytes, .. } => *bytes,
        }
    }
}

/// Copy `source` into `sink` until either side ends.
///
/// `write_all` suspends while the pipe buffer is full, so a slow consumer
/// throttles the source instead of growing memory. The sink is borrowed:
/// a pipe stays open until the caller drops it, so the reader never sees
/// EOF before the caller has seen the outcome.
pub async fn forward<W>(mut source: ByteStream, sink: &mut W, label: &'static str) -> ForwardOutcome
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = 0u64;

    while let Some(chunk) = source.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                debug!(input = label, bytes, error = %error, "Source stream failed");
                return ForwardOutcome::SourceFailed { bytes, error };
            }
        };
        if let Err(error) = sink.write_all(&chunk).await {
            debug!(input = label, bytes, error = %error, "Process input closed");
            return ForwardOutcome::SinkClosed { bytes, error };
        }
        bytes += chunk.len() as u64;
        trace!(input = label, bytes, "Forwarded chunk");
    }

    if let Err(error) = sink.shutdown().await {
        return ForwardOutcome::SinkClosed { bytes, error };
    }

    debug!(input = label, bytes, "Source stream finished");
    ForwardOutcome::Completed { bytes }
}

/// Create a FIFO readable and writable only by this user.
#[cfg(unix)]
pub fn make_fifo(path: &Path) -> io::Result<()> {
    use nix::sys::stat::Mode;

    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(io::Error::from)
}

#[cfg(not(unix))]
pub fn make_fifo(_path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "named pipes are only supported on unix",
    ))
}

/// Open the write end of a FIFO.
///
/// A non-blocking open fails with `ENXIO` until the process has opened the
/// read end, so the open is retried. The caller bounds the wait: the job is
/// torn down if the process exits or the deadline passes first.
#[cfg(unix)]
pub async fn open_fifo_sender(path: &Path) -> io::Result<tokio::net::unix::pipe::Sender> {
    use nix::errno::Errno;
    use tokio::net::unix::pipe;

    loop {
        match pipe::OpenOptions::new().open_sender(path) {
            Ok(sender) => return Ok(sender),
            Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => {
                tokio::time::sleep(FIFO_OPEN_POLL).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(not(unix))]
pub async fn open_fifo_sender(_path: &Path) -> io::Result<tokio::io::Sink> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "named pipes are only supported on unix",
    ))
}
