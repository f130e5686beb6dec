use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the upload service
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Listening port (default: 3000)
    pub port: u16,

    /// Directory holding every stored file (default: "uploads")
    pub storage_dir: PathBuf,

    /// URL path segment the storage directory is served under (default: "uploads")
    pub public_mount: String,

    /// Maximum upload size in bytes (default: 5 MB)
    pub max_file_size: usize,

    /// Rate limit window in seconds (default: 60)
    pub rate_limit_window_secs: u64,

    /// Uploads allowed per client per window (default: 10)
    pub rate_limit_max_requests: u32,

    /// Transcoder type: "ffmpeg" or "noop" (default: "ffmpeg")
    pub transcoder_type: String,

    /// Location of the ffmpeg binary (default: "ffmpeg", resolved via PATH)
    pub ffmpeg_path: PathBuf,

    /// MP3 bitrate in kbps (default: 128)
    pub transcode_bitrate_kbps: u32,

    /// Upper bound for a single transcoder run in seconds (default: 300)
    pub transcode_timeout_secs: u64,

    /// Transcoder runs allowed at once (default: 4)
    pub max_concurrent_transcodes: usize,

    /// Allowed CORS origins; empty means any origin
    pub cors_allowed_origins: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            storage_dir: PathBuf::from("uploads"),
            public_mount: "uploads".to_string(),
            max_file_size: 5 * 1024 * 1024, // 5 MB
            rate_limit_window_secs: 60,
            rate_limit_max_requests: 10,
            transcoder_type: "ffmpeg".to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            transcode_bitrate_kbps: 128,
            transcode_timeout_secs: 300,
            max_concurrent_transcodes: 4,
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            port: parse_var("PORT").unwrap_or(default.port),

            storage_dir: env::var("STORAGE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.storage_dir),

            public_mount: env::var("PUBLIC_MOUNT")
                .ok()
                .map(|v| v.trim_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default.public_mount),

            max_file_size: parse_var("MAX_FILE_SIZE").unwrap_or(default.max_file_size),

            rate_limit_window_secs: parse_var("RATE_LIMIT_WINDOW_SECS")
                .filter(|v| *v > 0)
                .unwrap_or(default.rate_limit_window_secs),

            rate_limit_max_requests: parse_var("RATE_LIMIT_MAX_REQUESTS")
                .unwrap_or(default.rate_limit_max_requests),

            transcoder_type: env::var("TRANSCODER_TYPE").unwrap_or(default.transcoder_type),

            ffmpeg_path: env::var("FFMPEG_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.ffmpeg_path),

            transcode_bitrate_kbps: parse_var("TRANSCODE_BITRATE_KBPS")
                .filter(|v| *v > 0)
                .unwrap_or(default.transcode_bitrate_kbps),

            transcode_timeout_secs: parse_var("TRANSCODE_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .unwrap_or(default.transcode_timeout_secs),

            max_concurrent_transcodes: parse_var("MAX_CONCURRENT_TRANSCODES")
                .filter(|v| *v > 0)
                .unwrap_or(default.max_concurrent_transcodes),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|v| parse_origin_list(&v))
                .unwrap_or(default.cors_allowed_origins),
        }
    }

    /// Create config for development (relaxed rate limit)
    pub fn development() -> Self {
        Self {
            rate_limit_max_requests: 1000,
            ..Self::default()
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "*")
        .map(|s| s.to_string())
        .collect()
}
