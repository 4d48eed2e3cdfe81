//! Shared fixtures: in-memory source streams and shell scripts standing in
//! for ffmpeg.

#![allow(dead_code)]

use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use bytes::Bytes;
use futures::{StreamExt, stream};
use tempfile::TempDir;

use ytgrab::source::ByteStream;

/// Finds the FIFO (the input after the second `-i`) and the output (last
/// argument) in a combiner command line.
const PRELUDE: &str = r#"#!/bin/sh
fifo=""
out=""
inputs=0
prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then
    inputs=$((inputs + 1))
    if [ "$inputs" -eq 2 ]; then fifo="$arg"; fi
  fi
  prev="$arg"
  out="$arg"
done
work=$(mktemp -d)
"#;

/// Reads the whole audio FIFO before touching stdin, then writes
/// video followed by audio to the output. Feeding the inputs one after
/// the other deadlocks against this script.
const CONCAT_MUXER: &str = r#"cat "$fifo" > "$work/audio"
cat > "$work/video"
cat "$work/video" "$work/audio" > "$out"
rm -rf "$work"
exit 0
"#;

const FAILING_MUXER: &str = r#"rm -rf "$work"
echo "pipe:0: Invalid data found when processing input" >&2
exit 3
"#;

const EMPTY_MUXER: &str = r#"cat "$fifo" > /dev/null
cat > /dev/null
rm -rf "$work"
exit 0
"#;

const HANGING_MUXER: &str = r#"rm -rf "$work"
exec sleep 30
"#;

/// Copies stdin to stdout, standing in for the MP3 encoder.
const PASSTHROUGH: &str = "#!/bin/sh\nexec cat\n";

/// Records its pid next to the script, then never reads or exits.
const PID_RECORDING_HANG: &str = "#!/bin/sh\necho $$ > \"$0.pid\"\nexec sleep 30\n";

/// Ignores the inputs and prints a version banner for `-version`.
const VERSION_ONLY: &str = "#!/bin/sh\necho \"ffmpeg version 0.0-test\"\n";

pub struct FakeMuxers {
    _dir: TempDir,
    pub concat: PathBuf,
    pub failing: PathBuf,
    pub empty: PathBuf,
    pub hanging: PathBuf,
    pub passthrough: PathBuf,
    pub pid_recording_hang: PathBuf,
    pub version_only: PathBuf,
}

/// Scripts are written once per test binary, before anything is spawned,
/// so no child can inherit a script's open write handle.
static MUXERS: LazyLock<FakeMuxers> = LazyLock::new(|| {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, body: &str, prelude: bool| {
        let path = dir.path().join(name);
        let contents = if prelude {
            format!("{}{}", PRELUDE, body)
        } else {
            body.to_string()
        };
        std::fs::write(&path, contents).unwrap();
        make_executable(&path);
        path
    };

    FakeMuxers {
        concat: write("concat.sh", CONCAT_MUXER, true),
        failing: write("failing.sh", FAILING_MUXER, true),
        empty: write("empty.sh", EMPTY_MUXER, true),
        hanging: write("hanging.sh", HANGING_MUXER, true),
        passthrough: write("passthrough.sh", PASSTHROUGH, false),
        pid_recording_hang: write("pid_hang.sh", PID_RECORDING_HANG, false),
        version_only: write("version.sh", VERSION_ONLY, false),
        _dir: dir,
    }
});

pub fn muxers() -> &'static FakeMuxers {
    &MUXERS
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

/// Deterministic payload of `len` bytes, distinct per `seed`.
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// A source that yields `data` in `chunk` sized pieces.
pub fn source(data: &[u8], chunk: usize) -> ByteStream {
    let chunks: Vec<io::Result<Bytes>> = data
        .chunks(chunk)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(chunks).boxed()
}

/// A source that pauses between chunks, like a throttled download.
pub fn paced_source(data: &[u8], chunk: usize, pause: Duration) -> ByteStream {
    source(data, chunk)
        .then(move |item| async move {
            tokio::time::sleep(pause).await;
            item
        })
        .boxed()
}

/// A source that fails after yielding `data`.
pub fn failing_source(data: &[u8]) -> ByteStream {
    let chunk: io::Result<Bytes> = Ok(Bytes::copy_from_slice(data));
    stream::iter(vec![chunk, Err(io::Error::other("connection reset"))]).boxed()
}

/// Names of the entries in `dir`.
pub fn entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|rd| {
            rd.flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}
