//! Runtime configuration loaded from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Default port, kept from the original service so existing clients keep working.
pub const DEFAULT_PORT: u16 = 3333;

/// Default admission ceiling on source duration.
pub const DEFAULT_MAX_DURATION_SECS: u64 = 600;

/// Default deadline for a single combine job.
pub const DEFAULT_COMBINE_TIMEOUT_SECS: u64 = 900;

/// Default upper bound on one yt-dlp metadata lookup.
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 60;

/// Default size of one ranged HTTP request when fetching a stream.
pub const DEFAULT_HTTP_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// The single origin allowed by CORS
    pub allowed_origin: String,
    /// Directory for request-scoped temporary files
    pub scratch_dir: PathBuf,
    /// Path to the ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to the yt-dlp binary
    pub ytdlp_path: String,
    /// Upper bound on one metadata lookup
    pub metadata_timeout: Duration,
    /// Longest source video accepted, in seconds
    pub max_duration_secs: u64,
    /// Deadline for one combine job; `None` disables it
    pub combine_timeout: Option<Duration>,
    /// Bytes requested per ranged HTTP request
    pub http_chunk_size: u64,
    /// Optional proxy for outbound HTTP
    pub proxy_url: Option<String>,
    /// Directory for rolling log files
    pub log_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            allowed_origin: "http://172.17.0.157".to_string(),
            scratch_dir: std::env::temp_dir().join("ytgrab"),
            ffmpeg_path: "ffmpeg".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            metadata_timeout: Duration::from_secs(DEFAULT_METADATA_TIMEOUT_SECS),
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            combine_timeout: Some(Duration::from_secs(DEFAULT_COMBINE_TIMEOUT_SECS)),
            http_chunk_size: DEFAULT_HTTP_CHUNK_SIZE,
            proxy_url: None,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS`, `API_PORT`
    /// - `CORS_ALLOWED_ORIGIN`
    /// - `SCRATCH_DIR`, `LOG_DIR`
    /// - `FFMPEG_PATH`, `YTDLP_PATH`, `YTDLP_TIMEOUT_SECS`
    /// - `MAX_DURATION_SECS`, `COMBINE_TIMEOUT_SECS` (0 disables the deadline)
    /// - `HTTP_CHUNK_SIZE`, `PROXY_URL`
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            config.bind_address = bind_address;
        }
        if let Some(port) = parse_or_warn::<u16>("API_PORT", get("API_PORT")) {
            config.port = port;
        }
        if let Some(origin) = get("CORS_ALLOWED_ORIGIN") {
            config.allowed_origin = origin;
        }
        if let Some(dir) = get("SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(path) = get("FFMPEG_PATH") {
            config.ffmpeg_path = path;
        }
        if let Some(path) = get("YTDLP_PATH") {
            config.ytdlp_path = path;
        }
        if let Some(secs) = parse_or_warn::<u64>("YTDLP_TIMEOUT_SECS", get("YTDLP_TIMEOUT_SECS"))
            && secs > 0
        {
            config.metadata_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_or_warn::<u64>("MAX_DURATION_SECS", get("MAX_DURATION_SECS")) {
            config.max_duration_secs = secs;
        }
        if let Some(secs) =
            parse_or_warn::<u64>("COMBINE_TIMEOUT_SECS", get("COMBINE_TIMEOUT_SECS"))
        {
            config.combine_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(size) = parse_or_warn::<u64>("HTTP_CHUNK_SIZE", get("HTTP_CHUNK_SIZE"))
            && size > 0
        {
            config.http_chunk_size = size;
        }
        config.proxy_url = get("PROXY_URL");

        config
    }
}

fn parse_or_warn<T: FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %value, "Ignoring invalid configuration value");
            None
        }
    }
}
