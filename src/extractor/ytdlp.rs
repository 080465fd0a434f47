//! yt-dlp process backend
//!
//! Runs yt-dlp as a child process, streams its output line by line into the
//! progress callback and keeps a table of running processes so a download
//! can be destroyed by id. ffmpeg is located during init and handed to
//! yt-dlp when present; without it yt-dlp still works for single-file
//! formats.

use crate::extractor::output::parse_progress_line;
use crate::extractor::request::{ExtractionRequest, ExtractionResponse};
use crate::extractor::traits::{ExtractionBackend, ProgressCallback};
use crate::utils::error::ClipkeepError;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as AsyncCommand;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Resolved tool locations, filled by `init`.
#[derive(Debug, Clone)]
struct ToolPaths {
    ytdlp: PathBuf,
    ffmpeg: Option<PathBuf>,
}

/// Extraction backend driving a yt-dlp binary
pub struct YtDlpBackend {
    configured_path: Option<PathBuf>,
    tools: Mutex<Option<ToolPaths>>,
    processes: Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>,
}

impl YtDlpBackend {
    /// `configured_path` skips discovery when set.
    pub fn new(configured_path: Option<PathBuf>) -> Self {
        Self {
            configured_path,
            tools: Mutex::new(None),
            processes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Path of the yt-dlp binary once initialized
    pub fn ytdlp_path(&self) -> Option<PathBuf> {
        self.tools
            .lock()
            .ok()
            .and_then(|t| t.as_ref().map(|t| t.ytdlp.clone()))
    }

    fn resolved_tools(&self) -> Result<ToolPaths> {
        self.tools
            .lock()
            .map_err(|_| ClipkeepError::OperationFailed("tool table poisoned".to_string()))?
            .clone()
            .ok_or_else(|| ClipkeepError::OperationFailed("yt-dlp backend not initialized".to_string()).into())
    }

    fn register(&self, process_id: &str) -> Result<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        let mut table = self
            .processes
            .lock()
            .map_err(|_| ClipkeepError::OperationFailed("process table poisoned".to_string()))?;
        table.insert(process_id.to_string(), tx);
        Ok(rx)
    }

    fn unregister(&self, process_id: &str) {
        if let Ok(mut table) = self.processes.lock() {
            table.remove(process_id);
        }
    }
}

impl Default for YtDlpBackend {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl ExtractionBackend for YtDlpBackend {
    fn id(&self) -> &'static str {
        "yt-dlp"
    }

    async fn init(&self) -> Result<()> {
        if self.ytdlp_path().is_some() {
            return Ok(());
        }

        let ytdlp = match self.configured_path.clone().or_else(find_ytdlp) {
            Some(path) => path,
            None => {
                error!("yt-dlp not found anywhere!");
                return Err(ClipkeepError::YtDlpNotFound.into());
            }
        };

        let output = AsyncCommand::new(&ytdlp).arg("--version").output().await?;
        if !output.status.success() {
            let msg = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(ClipkeepError::ExtractionError(format!(
                "{} --version failed: {}",
                ytdlp.display(),
                msg.trim()
            ))
            .into());
        }
        info!(
            "yt-dlp {} ready at {}",
            String::from_utf8_lossy(&output.stdout).trim(),
            ytdlp.display()
        );

        let ffmpeg = find_ffmpeg();
        match &ffmpeg {
            Some(path) => info!("ffmpeg found at {}", path.display()),
            None => warn!("ffmpeg not found, continuing without it (merged formats will fail)"),
        }

        if let Ok(mut tools) = self.tools.lock() {
            *tools = Some(ToolPaths { ytdlp, ffmpeg });
        }
        Ok(())
    }

    async fn execute(
        &self,
        request: &ExtractionRequest,
        process_id: &str,
        progress: ProgressCallback,
    ) -> Result<ExtractionResponse> {
        let tools = self.resolved_tools()?;

        let mut request = request.clone();
        if let Some(ffmpeg) = &tools.ffmpeg {
            if !request.has_flag("--ffmpeg-location") {
                request.add_option("--ffmpeg-location", ffmpeg.to_string_lossy());
            }
        }
        let args = request.build_args();
        debug!("[{}] yt-dlp args: {:?}", process_id, args);

        // Registered before spawning so an early destroy still reaches the loop
        let mut cancel_rx = self.register(process_id)?;
        let _registration = Registration {
            backend: self,
            process_id,
        };

        let started = Instant::now();
        let mut child = AsyncCommand::new(&tools.ytdlp)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClipkeepError::ExtractionError(format!("Failed to start yt-dlp: {}", e)))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ClipkeepError::ExtractionError("Failed to capture output".to_string()).into());
        };

        // Raw bytes: yt-dlp may print file names that are not valid UTF-8
        let mut stdout = BufReader::new(stdout);
        let mut stderr = BufReader::new(stderr);
        let (mut stdout_buf, mut stderr_buf) = (Vec::new(), Vec::new());
        let mut out = String::new();
        let mut err = String::new();
        let (mut stdout_open, mut stderr_open) = (true, true);

        while stdout_open || stderr_open {
            tokio::select! {
                _ = &mut cancel_rx => {
                    info!("[{}] destroying yt-dlp process", process_id);
                    let _ = child.kill().await;
                    return Err(ClipkeepError::OperationFailed(format!(
                        "process {} destroyed",
                        process_id
                    ))
                    .into());
                }
                read = stdout.read_until(b'\n', &mut stdout_buf), if stdout_open => match read {
                    Ok(0) => stdout_open = false,
                    Ok(_) => {
                        let line = take_line(&mut stdout_buf);
                        let parsed = parse_progress_line(&line);
                        progress(
                            parsed.map(|p| p.percent),
                            parsed.and_then(|p| p.eta_secs),
                            &line,
                        );
                        out.push_str(&line);
                        out.push('\n');
                    }
                    Err(e) => {
                        warn!("[{}] stdout read failed: {}", process_id, e);
                        stdout_open = false;
                    }
                },
                read = stderr.read_until(b'\n', &mut stderr_buf), if stderr_open => match read {
                    Ok(0) => stderr_open = false,
                    Ok(_) => {
                        let line = take_line(&mut stderr_buf);
                        debug!("[{}] yt-dlp stderr: {}", process_id, line);
                        err.push_str(&line);
                        err.push('\n');
                    }
                    Err(e) => {
                        warn!("[{}] stderr read failed: {}", process_id, e);
                        stderr_open = false;
                    }
                },
            }
        }

        let status = child.wait().await?;

        let exit_code = status.code().unwrap_or(-1);
        debug!("[{}] yt-dlp exited with {}", process_id, exit_code);

        Ok(ExtractionResponse {
            exit_code,
            out,
            err,
            elapsed: started.elapsed(),
        })
    }

    async fn destroy_process(&self, process_id: &str) -> bool {
        let sender = self
            .processes
            .lock()
            .ok()
            .and_then(|mut table| table.remove(process_id));

        match sender {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

/// Removes a process from the table when its `execute` call ends, including
/// when the call is dropped mid-run.
struct Registration<'a> {
    backend: &'a YtDlpBackend,
    process_id: &'a str,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.backend.unregister(self.process_id);
    }
}

/// Drain one buffered line, decoding invalid UTF-8 lossily.
fn take_line(buf: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    buf.clear();
    line
}

// ============================================================
// Tool Detection Functions
// ============================================================

/// Find yt-dlp binary with priority:
/// 1. Next to the executable
/// 2. System PATH
/// 3. Common installation paths
pub fn find_ytdlp() -> Option<PathBuf> {
    if let Some(local) = find_next_to_exe("yt-dlp") {
        info!("✓ Using bundled yt-dlp: {:?}", local);
        return Some(local);
    }

    if let Ok(system) = which::which("yt-dlp") {
        info!("✓ Using system yt-dlp: {:?}", system);
        return Some(system);
    }

    if let Some(common) = find_in_common_paths("yt-dlp") {
        info!("✓ Using yt-dlp from common path: {:?}", common);
        return Some(common);
    }

    warn!("✗ yt-dlp not found anywhere!");
    None
}

/// Find ffmpeg next to the executable, on PATH or in common locations
pub fn find_ffmpeg() -> Option<PathBuf> {
    find_next_to_exe("ffmpeg")
        .or_else(|| which::which("ffmpeg").ok())
        .or_else(|| find_in_common_paths("ffmpeg"))
}

fn find_next_to_exe(name: &str) -> Option<PathBuf> {
    let exe_path = std::env::current_exe().ok()?;
    let candidate = exe_path.parent()?.join(name);
    if candidate.is_file() && is_executable(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

fn find_in_common_paths(name: &str) -> Option<PathBuf> {
    let mut dirs_to_check = vec![
        // macOS Homebrew (Apple Silicon)
        PathBuf::from("/opt/homebrew/bin"),
        // macOS Homebrew (Intel), manual installs
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/usr/bin"),
    ];
    // pip user install
    if let Some(home) = dirs::home_dir() {
        dirs_to_check.push(home.join(".local").join("bin"));
    }

    dirs_to_check
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|path| path.is_file() && is_executable(path))
}

/// Check if a file is executable
fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        std::fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.exists()
    }
}

// ============================================================
// Tests
// ============================================================
