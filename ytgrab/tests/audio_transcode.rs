//! Tests for the streaming MP3 transcoder.
//!
//! `cat` stands in for the encoder, so the output equals the input.

#![cfg(unix)]

mod common;

use std::io;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;

use common::{failing_source, muxers, payload, source};
use ytgrab::pipeline::{AudioTranscoder, TranscodeStream};

const TEST_DEADLINE: Duration = Duration::from_secs(30);

fn transcoder(encoder: &Path) -> AudioTranscoder {
    AudioTranscoder::new(encoder.to_string_lossy().into_owned())
}

/// Bytes yielded before the stream ended, and the error it ended with.
async fn drain(mut stream: TranscodeStream) -> (Vec<u8>, Option<io::Error>) {
    let collect = async {
        let mut data = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => data.extend_from_slice(&chunk),
                Err(error) => {
                    // Nothing follows an error.
                    assert!(stream.next().await.is_none());
                    return (data, Some(error));
                }
            }
        }
        (data, None)
    };
    tokio::time::timeout(TEST_DEADLINE, collect)
        .await
        .expect("transcode stalled")
}

#[tokio::test]
async fn test_transcode_streams_encoder_output() {
    let input = payload(300_000, 7);
    let stream = transcoder(&muxers().passthrough)
        .transcode(source(&input, 8192), 192)
        .unwrap();

    let (data, error) = drain(stream).await;
    assert!(error.is_none(), "{:?}", error);
    assert_eq!(data, input);
}

#[tokio::test]
async fn test_source_failure_ends_stream_with_error() {
    let stream = transcoder(&muxers().passthrough)
        .transcode(failing_source(b"abc"), 128)
        .unwrap();

    let (data, error) = drain(stream).await;
    let error = error.expect("stream ended cleanly");
    assert_eq!(error.to_string(), "connection reset");
    assert!(data.len() <= 3);
}

#[tokio::test]
async fn test_encoder_failure_ends_stream_with_error() {
    let stream = transcoder(&muxers().failing)
        .transcode(source(&payload(1024, 3), 256), 128)
        .unwrap();

    let (data, error) = drain(stream).await;
    let error = error.expect("stream ended cleanly");
    assert!(error.to_string().contains("exit code 3"), "{}", error);
    assert!(data.is_empty());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_dropping_stream_kills_encoder() {
    let script = &muxers().pid_recording_hang;
    let pid_file = script.with_extension("sh.pid");
    let _ = std::fs::remove_file(&pid_file);

    let stream = transcoder(script)
        .transcode(futures::stream::pending::<io::Result<bytes::Bytes>>().boxed(), 128)
        .unwrap();

    let pid = tokio::time::timeout(TEST_DEADLINE, async {
        loop {
            if let Some(pid) = std::fs::read_to_string(&pid_file)
                .ok()
                .and_then(|s| s.trim().parse::<u32>().ok())
            {
                return pid;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("encoder never started");
    assert!(is_running(pid));

    drop(stream);

    tokio::time::timeout(TEST_DEADLINE, async {
        while is_running(pid) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("encoder survived the dropped stream");
}

/// Alive and not a zombie waiting to be reaped.
#[cfg(target_os = "linux")]
fn is_running(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            // The state follows the parenthesised command name.
            let state = stat.rsplit_once(')')?.1.trim_start().chars().next()?;
            Some(state != 'Z' && state != 'X')
        })
        .unwrap_or(false)
}
