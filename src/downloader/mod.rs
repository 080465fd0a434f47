//! Download orchestration and its observable state

pub mod orchestrator;
pub mod state;

pub use orchestrator::{DownloadOrchestrator, DownloadOutcome, StartOutcome, StopOutcome};
pub use state::{DownloadPhase, DownloadSnapshot, HistoryItem, HistoryStatus, InitState};
