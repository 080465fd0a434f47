//! Download orchestration state machine
//!
//! `Idle → Initializing → Downloading { attempt } → Completed | Failed`
//!
//! One request at a time: the phase is checked and claimed in a single
//! update of the snapshot channel, so a start request that arrives while
//! another is initializing or downloading is dropped. The extraction
//! subsystem is initialized lazily on the first request and again after a
//! failed initialization. Format strategies are tried in order until one
//! succeeds; the result is recorded in the catalog.

use crate::database::{CatalogEntry, CatalogStore};
use crate::downloader::state::{
    DownloadPhase, DownloadSnapshot, HistoryItem, HistoryStatus, InitState,
};
use crate::extractor::output::parse_output;
use crate::extractor::request::{fallback_file_path, ExtractionRequest, ExtractionResponse};
use crate::extractor::traits::{ExtractionBackend, ProgressCallback};
use crate::extractor::url::{infer_platform, validate_url};
use crate::utils::config::AppSettings;
use crate::utils::error::DownloadError;
use crate::utils::permissions::Permissions;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const INIT_TROUBLESHOOTING: &str = "Troubleshooting:\n\
    • Ensure yt-dlp is installed and on PATH (or set ytdlp_path)\n\
    • Check that the binary is executable\n\
    • Verify network access is allowed\n\
    • Try again";

const DOWNLOAD_TROUBLESHOOTING: &str = "Troubleshooting:\n\
    • Check internet connection\n\
    • Video may be private, deleted, or region-blocked\n\
    • Try a different video URL\n\
    • Some videos may require login or have restrictions";

/// A finished download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    /// The entry as recorded; `id` is `None` when the catalog write failed
    pub entry: CatalogEntry,
    pub catalog_id: Option<i64>,
    /// Strategy that succeeded
    pub format: String,
    /// Number of backend invocations, including the successful one
    pub attempts: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Another request is in flight; nothing was done
    Busy,
    Finished(DownloadOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NoActiveDownload,
}

/// Process id and stop signals of the run currently downloading.
#[derive(Clone)]
struct ActiveRun {
    process_id: String,
    cancelled: Arc<AtomicBool>,
    /// Wakes the attempt loop so it drops the in-flight backend call
    stop: Arc<Notify>,
}

pub struct DownloadOrchestrator {
    backend: Arc<dyn ExtractionBackend>,
    catalog: CatalogStore,
    settings: AppSettings,
    strategies: Vec<String>,
    init_state: tokio::sync::Mutex<InitState>,
    snapshot: Arc<watch::Sender<DownloadSnapshot>>,
    active: Mutex<Option<ActiveRun>>,
}

impl DownloadOrchestrator {
    pub fn new(
        backend: Arc<dyn ExtractionBackend>,
        catalog: CatalogStore,
        settings: AppSettings,
    ) -> Self {
        let strategies = settings.strategies();
        let (snapshot, _) = watch::channel(DownloadSnapshot::default());
        Self {
            backend,
            catalog,
            settings,
            strategies,
            init_state: tokio::sync::Mutex::new(InitState::Uninitialized),
            snapshot: Arc::new(snapshot),
            active: Mutex::new(None),
        }
    }

    /// Replace the strategy list. An empty list keeps the current one.
    pub fn with_strategies(mut self, strategies: Vec<String>) -> Self {
        if !strategies.is_empty() {
            self.strategies = strategies;
        }
        self
    }

    pub fn strategies(&self) -> &[String] {
        &self.strategies
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn download_dir(&self) -> &Path {
        &self.settings.download_location
    }

    /// Check the preconditions for a download into the configured directory.
    pub fn probe_permissions(&self) -> Permissions {
        Permissions::probe(&self.settings.download_location, &self.settings)
    }

    /// Live view of the download state.
    pub fn subscribe(&self) -> watch::Receiver<DownloadSnapshot> {
        self.snapshot.subscribe()
    }

    /// Current download state
    pub fn snapshot(&self) -> DownloadSnapshot {
        self.snapshot.borrow().clone()
    }

    pub async fn init_state(&self) -> InitState {
        self.init_state.lock().await.clone()
    }

    /// Run one download request to its end.
    ///
    /// Returns `Ok(StartOutcome::Busy)` without side effects when another
    /// request is in flight.
    pub async fn start_download(
        &self,
        url: &str,
        permissions: Permissions,
    ) -> Result<StartOutcome, DownloadError> {
        if self.snapshot.borrow().phase.is_busy() {
            debug!("Download already in progress, ignoring request");
            return Ok(StartOutcome::Busy);
        }

        let url = match validate_url(url) {
            Ok(url) => url.to_string(),
            Err(e) => {
                let message = e.to_string();
                self.snapshot.send_modify(|s| {
                    s.url = url.trim().to_string();
                    s.url_error = Some(message);
                });
                return Err(e.into());
            }
        };

        if !permissions.all_granted() {
            let missing = permissions.missing();
            warn!("Download blocked, missing permissions: {:?}", missing);
            self.snapshot.send_modify(|s| {
                s.status_text = format!("Permission required: {}", missing.join(", "));
            });
            return Err(DownloadError::PermissionDenied(missing));
        }

        let needs_init = *self.init_state.lock().await != InitState::Ready;
        if !self.claim(&url, needs_init) {
            debug!("Download already in progress, ignoring request");
            return Ok(StartOutcome::Busy);
        }

        info!("Starting download for URL: {}", url);
        if let Err(e) = self.ensure_initialized().await {
            self.snapshot.send_modify(|s| {
                s.phase = DownloadPhase::Idle;
                s.status_text = "Initialization failed".to_string();
                s.command_output = format!("Initialization Error: {}\n\n{}", e, INIT_TROUBLESHOOTING);
            });
            return Err(e);
        }

        let run = ActiveRun {
            process_id: format!("download_{}", Uuid::new_v4()),
            cancelled: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Notify::new()),
        };
        self.set_active(Some(run.clone()));

        let result = self.run_attempts(&url, &run).await;

        self.clear_active(&run.process_id);
        if matches!(result, Err(DownloadError::Cancelled)) {
            self.mark_stopped(&url);
        }
        result.map(StartOutcome::Finished)
    }

    /// Ask the backend to destroy the running process.
    ///
    /// The phase stays busy until the in-flight request has returned
    /// `DownloadError::Cancelled`; only then does it move to `Idle`.
    pub async fn stop_download(&self) -> StopOutcome {
        let run = self.active.lock().ok().and_then(|active| active.clone());

        let Some(run) = run else {
            warn!("No active download to stop");
            self.snapshot.send_modify(|s| {
                s.status_text = "No active download to stop".to_string();
            });
            return StopOutcome::NoActiveDownload;
        };

        info!("Destroying process: {}", run.process_id);
        run.cancelled.store(true, Ordering::SeqCst);
        run.stop.notify_one();
        let destroyed = self.backend.destroy_process(&run.process_id).await;
        debug!("Process {} destroyed by backend: {}", run.process_id, destroyed);

        self.snapshot.send_modify(|s| {
            s.status_text = "Stopping download...".to_string();
        });
        StopOutcome::Stopped
    }

    fn mark_stopped(&self, url: &str) {
        self.snapshot.send_modify(|s| {
            s.phase = DownloadPhase::Idle;
            s.status_text = "Download stopped by user".to_string();
            s.append_output("Download stopped by user");
            s.record_history(HistoryItem {
                url: url.to_string(),
                title: "Stopped Download".to_string(),
                file_path: String::new(),
                timestamp: Utc::now(),
                status: HistoryStatus::Failed,
            });
        });
    }

    /// Move from a non-busy phase into `Initializing` or `Downloading`.
    fn claim(&self, url: &str, needs_init: bool) -> bool {
        self.snapshot.send_if_modified(|s| {
            if s.phase.is_busy() {
                return false;
            }
            s.url = url.to_string();
            s.url_error = None;
            s.progress = 0.0;
            if needs_init {
                s.phase = DownloadPhase::Initializing;
                s.status_text = "Initializing downloader libraries...".to_string();
            } else {
                s.phase = DownloadPhase::Downloading { attempt: 0 };
                s.status_text = "Preparing download...".to_string();
            }
            true
        })
    }

    async fn ensure_initialized(&self) -> Result<(), DownloadError> {
        let mut state = self.init_state.lock().await;
        if *state == InitState::Ready {
            return Ok(());
        }

        info!("Initializing extraction backend {}", self.backend.id());
        *state = InitState::Initializing;
        match self.backend.init().await {
            Ok(()) => {
                *state = InitState::Ready;
                self.snapshot.send_modify(|s| {
                    s.status_text = "Libraries initialized, starting download...".to_string();
                });
                Ok(())
            }
            Err(e) => {
                error!("Failed to initialize {}: {:#}", self.backend.id(), e);
                let message = e.to_string();
                *state = InitState::Failed(message.clone());
                Err(DownloadError::Initialization(message))
            }
        }
    }

    async fn run_attempts(&self, url: &str, run: &ActiveRun) -> Result<DownloadOutcome, DownloadError> {
        let download_dir = self.settings.download_location.clone();
        if let Err(e) = tokio::fs::create_dir_all(&download_dir).await {
            warn!("Could not create download directory {:?}: {}", download_dir, e);
        }
        debug!("Download directory: {:?}, process id: {}", download_dir, run.process_id);

        self.snapshot.send_modify(|s| {
            s.phase = DownloadPhase::Downloading { attempt: 0 };
            s.progress = 0.0;
            s.status_text = "Preparing download...".to_string();
            s.command_output = format!("Starting download to: {}", download_dir.display());
            s.record_history(HistoryItem {
                url: url.to_string(),
                title: String::new(),
                file_path: download_dir.to_string_lossy().into_owned(),
                timestamp: Utc::now(),
                status: HistoryStatus::InProgress,
            });
        });

        let progress = self.progress_callback(run.cancelled.clone());
        let total = self.strategies.len();
        let mut last_error = String::from("no format strategies configured");

        for (index, format) in self.strategies.iter().enumerate() {
            if run.cancelled.load(Ordering::SeqCst) {
                return Err(DownloadError::Cancelled);
            }

            self.snapshot.send_modify(|s| {
                s.phase = DownloadPhase::Downloading { attempt: index };
                if index > 0 {
                    s.status_text =
                        format!("Format failed, trying alternative... ({}/{})", index + 1, total);
                }
            });
            info!("Trying format: {} (attempt {}/{})", format, index + 1, total);

            let request = ExtractionRequest::for_download(url, &download_dir, format, &self.settings);
            let execute = self
                .backend
                .execute(&request, &run.process_id, progress.clone());

            // Dropping `execute` ends the call even if the backend missed the destroy
            let result = tokio::select! {
                biased;
                _ = run.stop.notified() => {
                    info!("Download {} stopped during attempt {}", run.process_id, index + 1);
                    return Err(DownloadError::Cancelled);
                }
                result = execute => result,
            };

            let succeeded = matches!(&result, Ok(response) if response.success());
            if !succeeded && run.cancelled.load(Ordering::SeqCst) {
                info!("Download {} stopped during attempt {}", run.process_id, index + 1);
                return Err(DownloadError::Cancelled);
            }

            match result {
                Ok(response) if response.success() => {
                    info!("Download completed with format: {}", format);
                    // Nothing left to stop
                    self.clear_active(&run.process_id);
                    return Ok(self
                        .complete(url, format, index + 1, &response, &download_dir)
                        .await);
                }
                Ok(response) => {
                    last_error = format!("exit code {}: {}", response.exit_code, response.err.trim());
                    warn!("Format {} failed with {}", format, last_error);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!("Format {} failed: {}", format, last_error);
                }
            }
        }

        error!("All format attempts failed for {}", url);
        self.snapshot.send_modify(|s| {
            s.phase = DownloadPhase::Failed;
            s.status_text = "Download failed".to_string();
            s.command_output = format!(
                "Download Error: {}\n\nAll {} format attempts failed.\n\n{}",
                last_error, total, DOWNLOAD_TROUBLESHOOTING
            );
            s.record_history(HistoryItem {
                url: url.to_string(),
                title: "Failed Download".to_string(),
                file_path: String::new(),
                timestamp: Utc::now(),
                status: HistoryStatus::Failed,
            });
        });

        Err(DownloadError::ExhaustedAttempts {
            attempts: total,
            last_error,
        })
    }

    /// Record a successful run. Catalog failures are logged, not surfaced.
    async fn complete(
        &self,
        url: &str,
        format: &str,
        attempts: usize,
        response: &ExtractionResponse,
        download_dir: &Path,
    ) -> DownloadOutcome {
        let parsed = parse_output(&response.out, Utc::now());
        let file_path: PathBuf = parsed
            .file_path
            .clone()
            .unwrap_or_else(|| fallback_file_path(download_dir, &parsed.title));
        let file_size = match tokio::fs::metadata(&file_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!("Could not stat downloaded file {:?}: {}", file_path, e);
                0
            }
        };

        let mut entry = CatalogEntry {
            id: None,
            title: parsed.title.clone(),
            url: url.to_string(),
            file_path,
            thumbnail_path: None,
            duration_ms: parsed.duration_secs.unwrap_or(0).saturating_mul(1000),
            file_size,
            downloaded_at: Utc::now(),
            platform: infer_platform(url).as_str().to_string(),
        };

        let catalog_id = match self.catalog.insert(&entry).await {
            Ok(id) => {
                info!("Saved {} to catalog as {}", entry.title, id);
                Some(id)
            }
            Err(e) => {
                error!("Failed to save {} to catalog: {:#}", entry.title, e);
                None
            }
        };
        entry.id = catalog_id;

        let summary = format!(
            "Download finished!\n\nFormat used: {}\nSaved to: {}\n\nOutput:\n{}",
            format,
            download_dir.display(),
            response.out.trim_end()
        );
        self.snapshot.send_modify(|s| {
            s.phase = DownloadPhase::Completed;
            s.progress = 100.0;
            s.status_text = "Download completed successfully!".to_string();
            s.command_output = summary;
            s.record_history(HistoryItem {
                url: url.to_string(),
                title: entry.title.clone(),
                file_path: entry.file_path.to_string_lossy().into_owned(),
                timestamp: entry.downloaded_at,
                status: HistoryStatus::Success,
            });
        });

        DownloadOutcome {
            entry,
            catalog_id,
            format: format.to_string(),
            attempts,
        }
    }

    fn progress_callback(&self, cancelled: Arc<AtomicBool>) -> ProgressCallback {
        let snapshot = self.snapshot.clone();
        Arc::new(move |percent: Option<f32>, eta: Option<u64>, line: &str| {
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            debug!("Progress: {:?}%, ETA: {:?}s, Line: {}", percent, eta, line);
            snapshot.send_modify(|s| {
                if let Some(percent) = percent {
                    s.progress = percent;
                }
                s.status_text = if line.is_empty() {
                    format!("Downloading... {}%", s.progress as u32)
                } else {
                    line.to_string()
                };
                if !line.is_empty() {
                    s.append_output(line);
                }
            });
        })
    }

    fn set_active(&self, run: Option<ActiveRun>) {
        if let Ok(mut active) = self.active.lock() {
            *active = run;
        }
    }

    fn clear_active(&self, process_id: &str) {
        if let Ok(mut active) = self.active.lock() {
            if active.as_ref().is_some_and(|run| run.process_id == process_id) {
                *active = None;
            }
        }
    }
}
