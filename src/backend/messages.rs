use crate::database::CatalogEntry;
use crate::downloader::{DownloadOutcome, DownloadSnapshot, StopOutcome};
use crate::utils::DownloadError;

/// Commands sent from a front-end to the backend
#[derive(Debug, Clone)]
pub enum BackendCommand {
    StartDownload { url: String },
    StopDownload,
    DeleteEntry(i64),
    // System
    Shutdown,
}

/// Events sent from the backend to a front-end
#[derive(Debug, Clone)]
pub enum BackendEvent {
    // Observable state
    Snapshot(DownloadSnapshot),
    CatalogChanged(Vec<CatalogEntry>),

    // Download life-cycle
    /// A start request arrived while another download was in flight
    DownloadIgnored { url: String },
    DownloadFinished(Result<DownloadOutcome, DownloadError>),
    StopResult(StopOutcome),

    // Catalog
    Deleted { id: i64, removed: bool },

    // System
    Error(String),
}
