use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Request rejected before any storage or transcoding work
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("rate limit exceeded, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("no file in field '{field}'")]
    MissingFile { field: &'static str },

    #[error("malformed upload body: {0}")]
    MalformedBody(String),
}

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    #[error("conversion timed out after {0}s")]
    TimedOut(u64),

    #[error("conversion I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Best-effort deletion failed; logged, never returned to a client
#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("failed to delete {}: {source}", path.display())]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to place file: {0}")]
    Persist(#[from] tempfile::PathPersistError),

    #[error("file not found")]
    NotFound,
}
