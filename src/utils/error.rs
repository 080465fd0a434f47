//! Error handling for clipkeep

use crate::extractor::url::UrlError;
use thiserror::Error;

/// Main error type for clipkeep
#[derive(Debug, Error)]
pub enum ClipkeepError {
    #[error("yt-dlp not found. Please install yt-dlp")]
    YtDlpNotFound,

    #[error("Failed to run extraction tool: {0}")]
    ExtractionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Catalog entry not found: {0}")]
    EntryNotFound(i64),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Why a download request did not produce a catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("{0}")]
    InvalidUrl(#[from] UrlError),

    #[error("Missing permissions: {}", .0.join(", "))]
    PermissionDenied(Vec<String>),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("All {attempts} format attempts failed: {last_error}")]
    ExhaustedAttempts { attempts: usize, last_error: String },

    #[error("Download stopped by user")]
    Cancelled,
}
