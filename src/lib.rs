//! clipkeep library

pub mod backend;
pub mod database;
pub mod downloader;
pub mod extractor;
pub mod utils;

// Re-export main types for easier use
pub use backend::{BackendActor, BackendCommand, BackendEvent};
pub use database::{CatalogEntry, CatalogStore};
pub use downloader::{DownloadOrchestrator, DownloadOutcome, DownloadPhase, DownloadSnapshot};
pub use extractor::{ExtractionBackend, Platform, YtDlpBackend};
pub use utils::{AppSettings, ClipkeepError, DownloadError};
