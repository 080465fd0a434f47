use crate::extractor::request::{ExtractionRequest, ExtractionResponse};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Progress callback: `(percent, eta_seconds, raw_line)`.
///
/// Invoked for every output line; `percent` is `None` for lines that carry
/// no progress information.
pub type ProgressCallback = Arc<dyn Fn(Option<f32>, Option<u64>, &str) + Send + Sync>;

/// Core trait for the external extraction subsystem
///
/// This trait isolates the orchestrator from the specific tool (yt-dlp
/// process, embedded library, test double). Implementations own the
/// process table used for cancellation.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Returns a unique identifier for this backend (e.g., "yt-dlp")
    fn id(&self) -> &'static str;

    /// Prepares the subsystem. Must be safe to call more than once.
    async fn init(&self) -> Result<()>;

    /// Runs one extraction/download request under `process_id`.
    ///
    /// A run that completes with a non-zero exit code is returned as `Ok`;
    /// `Err` means the run could not be performed or was destroyed.
    async fn execute(
        &self,
        request: &ExtractionRequest,
        process_id: &str,
        progress: ProgressCallback,
    ) -> Result<ExtractionResponse>;

    /// Requests termination of a running process. Returns `false` if no
    /// process with that id is active.
    async fn destroy_process(&self, process_id: &str) -> bool;
}
