// Reelvault Error Types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Query failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Name collision: {0}")]
    NameCollision(String),

    #[error("Invalid stream index: {0}")]
    InvalidStreamIndex(i64),

    #[error("Missing video stream")]
    MissingVideoStream,

    #[error("Missing audio stream")]
    MissingAudioStream,

    #[error("FFprobe error: {0}")]
    ProbeError(String),

    #[error("No streams found in {0}")]
    NoStreamsFound(String),

    #[error("Transcode stalled: no progress within {0} seconds")]
    TranscodeStalled(u64),

    #[error("Transcode process failed: {0}")]
    TranscodeProcessFailed(String),

    #[error("{operation}: {} artifact(s) failed to move", failures.len())]
    PartialMove {
        operation: String,
        moved: Vec<PathBuf>,
        failures: Vec<(PathBuf, String)>,
    },

    #[error("Library not configured: {0}")]
    NotConfigured(String),

    #[error("Hash error: {0}")]
    Hash(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for LibraryError {
    fn from(err: anyhow::Error) -> Self {
        LibraryError::Other(err.to_string())
    }
}

impl LibraryError {
    /// True for errors that are rejected before any state is touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LibraryError::NotFound(_)
                | LibraryError::ValidationFailed(_)
                | LibraryError::InvalidName(_)
                | LibraryError::NameCollision(_)
                | LibraryError::InvalidStreamIndex(_)
                | LibraryError::MissingVideoStream
                | LibraryError::MissingAudioStream
        )
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
