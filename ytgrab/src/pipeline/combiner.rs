//! Stream combiner: muxes a video-only and an audio-only byte stream into
//! one MP4 file by driving ffmpeg.
//!
//! Input 0 is the video, written to the muxer's stdin. Input 1 is the audio,
//! written to a FIFO next to the output file. Both inputs are fed by their
//! own task; feeding them one after the other deadlocks as soon as the
//! muxer blocks on the input that is not being written.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use process_utils::{ExitReport, tokio_command};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use super::delivery::TempFile;
use super::forward::{ForwardOutcome, forward, make_fifo, open_fifo_sender};
use super::scratch::ScratchDir;
use crate::config::DEFAULT_COMBINE_TIMEOUT_SECS;
use crate::source::ByteStream;
use crate::utils::fs::file_len;

/// Lines of muxer stderr kept for diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for stderr to drain after the muxer exits.
const STDERR_GRACE: Duration = Duration::from_secs(2);

/// Audio codecs MP4 can carry as-is.
const MP4_AUDIO_CODECS: &[&str] = &["mp4a", "aac", "mp3"];

/// Why a combine job failed.
#[derive(Debug, Error)]
pub enum CombineError {
    #[error("failed to start muxer: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed to prepare audio input '{}': {source}", path.display())]
    AudioInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{input} source stream failed: {source}")]
    SourceStream {
        input: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("muxer failed with {exit}")]
    ProcessFailed { exit: ExitReport, stderr_tail: String },

    #[error("muxer exited cleanly but produced no output")]
    EmptyOutput,

    #[error("combine did not finish within {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("combine was cancelled")]
    Cancelled,

    #[error("muxer IO error: {0}")]
    Io(#[from] io::Error),
}

/// What to do with the audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodecPolicy {
    /// Copy the audio stream without re-encoding.
    Copy,
    /// Re-encode to AAC.
    Aac,
}

impl AudioCodecPolicy {
    /// Copy when the source codec fits in MP4, otherwise re-encode.
    pub fn for_codec(acodec: Option<&str>) -> Self {
        let Some(codec) = acodec else {
            return Self::Aac;
        };
        let codec = codec.to_ascii_lowercase();
        if MP4_AUDIO_CODECS.iter().any(|known| codec.starts_with(known)) {
            Self::Copy
        } else {
            Self::Aac
        }
    }

    fn as_ffmpeg_args(self) -> [String; 2] {
        match self {
            Self::Copy => ["-c:a".to_string(), "copy".to_string()],
            Self::Aac => ["-c:a".to_string(), "aac".to_string()],
        }
    }
}

/// Combiner settings.
#[derive(Debug, Clone)]
pub struct CombineConfig {
    /// Path to the ffmpeg binary.
    pub ffmpeg_path: String,
    /// Deadline for one job; `None` disables it.
    pub timeout: Option<Duration>,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_COMBINE_TIMEOUT_SECS)),
        }
    }
}

/// Lifecycle of one combine job. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Piping,
    Succeeded,
    Failed,
}

/// A finished container file, still owned by its guard.
#[derive(Debug)]
pub struct CombinedFile {
    pub file: TempFile,
    pub size: u64,
}

impl CombinedFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// One in-flight muxing operation and the paths it owns.
struct CombineJob {
    id: String,
    state: JobState,
    output: TempFile,
    fifo: TempFile,
    started: Instant,
}

impl CombineJob {
    fn new(scratch: &ScratchDir) -> Self {
        let id = scratch.unique_stem();
        Self {
            output: TempFile::new(scratch.output_path(&id)),
            fifo: TempFile::new(scratch.fifo_path(&id)),
            id,
            state: JobState::Idle,
            started: Instant::now(),
        }
    }

    fn transition(&mut self, next: JobState) {
        debug!(job = %self.id, from = ?self.state, to = ?next, "Combine job state change");
        self.state = next;
    }

    fn fail(mut self, error: CombineError) -> CombineError {
        self.transition(JobState::Failed);
        self.output.remove();
        self.fifo.remove();
        warn!(
            job = %self.id,
            error = %error,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Combine job failed"
        );
        error
    }

    fn succeed(mut self, size: u64) -> CombinedFile {
        self.transition(JobState::Succeeded);
        self.fifo.remove();
        info!(
            job = %self.id,
            size,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Combine job succeeded"
        );
        let CombineJob { output, .. } = self;
        CombinedFile { file: output, size }
    }
}

/// Muxes pairs of elementary streams into MP4 files in the scratch directory.
pub struct StreamCombiner {
    config: CombineConfig,
    scratch: ScratchDir,
}

impl StreamCombiner {
    pub fn new(config: CombineConfig, scratch: ScratchDir) -> Self {
        Self { config, scratch }
    }

    /// First line of `ffmpeg -version`, or `None` if the muxer cannot run.
    pub async fn detect_muxer_version(&self) -> Option<String> {
        let output = tokio_command(&self.config.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;
        String::from_utf8(output.stdout)
            .ok()
            .and_then(|s| s.lines().next().map(str::to_string))
            .filter(|line| !line.is_empty())
    }

    pub fn build_args(audio_input: &Path, policy: AudioCodecPolicy, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];

        args.extend(["-i".to_string(), "pipe:0".to_string()]);
        args.extend(["-i".to_string(), audio_input.to_string_lossy().into_owned()]);

        args.extend(["-map".to_string(), "0:v:0".to_string()]);
        args.extend(["-map".to_string(), "1:a:0".to_string()]);

        args.extend(["-c:v".to_string(), "copy".to_string()]);
        args.extend(policy.as_ffmpeg_args());

        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        args.extend(["-f".to_string(), "mp4".to_string()]);
        args.push(output.to_string_lossy().into_owned());

        args
    }

    /// Mux `video` and `audio` into a new file.
    ///
    /// On failure the process is gone and nothing is left in the scratch
    /// directory. Dropping the returned future has the same effect.
    pub async fn combine(
        &self,
        video: ByteStream,
        audio: ByteStream,
        policy: AudioCodecPolicy,
        cancel: &CancellationToken,
    ) -> Result<CombinedFile, CombineError> {
        let mut job = CombineJob::new(&self.scratch);
        info!(job = %job.id, ?policy, "Starting combine job");

        match self.run(&mut job, video, audio, policy, cancel).await {
            Ok(size) => Ok(job.succeed(size)),
            Err(error) => Err(job.fail(error)),
        }
    }

    async fn run(
        &self,
        job: &mut CombineJob,
        video: ByteStream,
        audio: ByteStream,
        policy: AudioCodecPolicy,
        cancel: &CancellationToken,
    ) -> Result<u64, CombineError> {
        let fifo_path = job.fifo.path().to_path_buf();
        make_fifo(&fifo_path).map_err(|source| CombineError::AudioInput {
            path: fifo_path.clone(),
            source,
        })?;

        let mut child = tokio_command(&self.config.ffmpeg_path)
            .args(Self::build_args(&fifo_path, policy, job.output.path()))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(CombineError::Spawn)?;
        job.transition(JobState::Piping);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CombineError::Spawn(io::Error::other("muxer stdin not captured")))?;
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| AbortOnDropHandle::new(tokio::spawn(drain_stderr(stderr, job.id.clone()))));

        // Both forwarders are running before either is awaited. Each hands its
        // input back still open; it is closed only once the outcome is known.
        let mut video_task = AbortOnDropHandle::new(tokio::spawn(async move {
            let mut stdin = stdin;
            let outcome = forward(video, &mut stdin, "video").await;
            Ok::<_, CombineError>((outcome, stdin))
        }));
        let mut audio_task = AbortOnDropHandle::new(tokio::spawn(async move {
            let mut sender = open_fifo_sender(&fifo_path)
                .await
                .map_err(|source| CombineError::AudioInput {
                    path: fifo_path.clone(),
                    source,
                })?;
            let outcome = forward(audio, &mut sender, "audio").await;
            Ok::<_, CombineError>((outcome, sender))
        }));

        let timeout = self.config.timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let mut video_running = true;
        let mut audio_running = true;

        let status = loop {
            // Forwarders are polled ahead of the exit so a failed source
            // always wins over a clean exit that follows it.
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    kill(&mut child, &job.id).await;
                    return Err(CombineError::Cancelled);
                }
                _ = &mut deadline => {
                    kill(&mut child, &job.id).await;
                    return Err(CombineError::TimedOut(timeout.unwrap_or_default()));
                }
                joined = &mut video_task, if video_running => {
                    video_running = false;
                    if let Err(error) = check_forward("video", joined) {
                        kill(&mut child, &job.id).await;
                        return Err(error);
                    }
                }
                joined = &mut audio_task, if audio_running => {
                    audio_running = false;
                    if let Err(error) = check_forward("audio", joined) {
                        kill(&mut child, &job.id).await;
                        return Err(error);
                    }
                }
                status = child.wait() => break status?,
            }
        };

        let exit = ExitReport::from(status);
        if !exit.success() {
            let stderr_tail = match stderr_task {
                Some(task) => tokio::time::timeout(STDERR_GRACE, task)
                    .await
                    .ok()
                    .and_then(Result::ok)
                    .unwrap_or_default(),
                None => String::new(),
            };
            warn!(job = %job.id, %exit, stderr = %stderr_tail, "Muxer exited unsuccessfully");
            return Err(CombineError::ProcessFailed { exit, stderr_tail });
        }

        // A missing or unreadable output counts as empty.
        let size = file_len(job.output.path()).await.ok().flatten().unwrap_or(0);
        if size == 0 {
            return Err(CombineError::EmptyOutput);
        }
        Ok(size)
    }
}

/// Decide whether a finished forwarder ends the job.
///
/// The process input handed back with the outcome is dropped on return,
/// after the verdict.
fn check_forward<W>(
    input: &'static str,
    joined: Result<Result<(ForwardOutcome, W), CombineError>, JoinError>,
) -> Result<(), CombineError> {
    let (outcome, _process_input) = match joined {
        Err(join_error) => return Err(CombineError::Io(io::Error::other(join_error))),
        Ok(Err(error)) => return Err(error),
        Ok(Ok(finished)) => finished,
    };

    match outcome {
        ForwardOutcome::SourceFailed { error, .. } => Err(CombineError::SourceStream {
            input,
            source: error,
        }),
        // The muxer stopped reading; its exit status decides.
        ForwardOutcome::SinkClosed { bytes, error } => {
            debug!(input, bytes, error = %error, "Muxer closed input early");
            Ok(())
        }
        ForwardOutcome::Completed { .. } => Ok(()),
    }
}

async fn kill(child: &mut Child, job: &str) {
    if let Err(e) = child.kill().await {
        debug!(job, error = %e, "Muxer already gone");
    }
}

/// Log muxer stderr and keep its last lines.
async fn drain_stderr(stderr: ChildStderr, job: String) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        debug!(job = %job, "muxer: {}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Vec::from(tail).join("\n")
}
