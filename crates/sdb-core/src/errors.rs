use std::{path::PathBuf, time::Duration};

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the dispatch
/// layer can decide what the user sees.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("{what} timed out after {}s", .after.as_secs())]
    Timeout { what: String, after: Duration },

    #[error("download failed: {0}")]
    Download(String),

    #[error("payload too large: {size} bytes (max {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
