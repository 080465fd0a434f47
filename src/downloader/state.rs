//! Observable download state
//!
//! Everything here is transient: it lives as long as the orchestrator that
//! owns it and is never persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Captured tool output keeps only the most recent lines.
pub const MAX_OUTPUT_LINES: usize = 200;

/// Orchestrator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DownloadPhase {
    #[default]
    Idle,
    Initializing,
    /// `attempt` is the zero-based index into the strategy list
    Downloading { attempt: usize },
    Completed,
    Failed,
}

impl DownloadPhase {
    /// A request is in flight; new start requests are dropped.
    pub fn is_busy(&self) -> bool {
        matches!(self, DownloadPhase::Initializing | DownloadPhase::Downloading { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadPhase::Idle => "Idle",
            DownloadPhase::Initializing => "Initializing",
            DownloadPhase::Downloading { .. } => "Downloading",
            DownloadPhase::Completed => "Completed",
            DownloadPhase::Failed => "Failed",
        }
    }
}

/// One-time initialization of the extraction subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InitState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    /// Last attempt failed; the next request retries
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HistoryStatus {
    InProgress,
    Success,
    Failed,
}

/// Session history entry, unique per URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    pub url: String,
    pub title: String,
    pub file_path: String,
    pub timestamp: DateTime<Utc>,
    pub status: HistoryStatus,
}

/// Everything a front-end needs to render the download form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownloadSnapshot {
    pub url: String,
    /// Inline validation message for `url`
    pub url_error: Option<String>,
    pub phase: DownloadPhase,
    /// 0.0..=100.0
    pub progress: f32,
    pub status_text: String,
    pub command_output: String,
    pub history: Vec<HistoryItem>,
}

impl DownloadSnapshot {
    /// Zero-based strategy index while downloading
    pub fn attempt(&self) -> Option<usize> {
        match self.phase {
            DownloadPhase::Downloading { attempt } => Some(attempt),
            _ => None,
        }
    }

    /// Add or replace the history entry for `item.url`; the newest goes last.
    pub fn record_history(&mut self, item: HistoryItem) {
        self.history.retain(|existing| existing.url != item.url);
        self.history.push(item);
    }

    /// Append one line of tool output, dropping the oldest lines past
    /// [`MAX_OUTPUT_LINES`].
    pub fn append_output(&mut self, line: &str) {
        if !self.command_output.is_empty() {
            self.command_output.push('\n');
        }
        self.command_output.push_str(line);

        let lines = self.command_output.lines().count();
        if lines > MAX_OUTPUT_LINES {
            let skip = lines - MAX_OUTPUT_LINES;
            self.command_output = self
                .command_output
                .lines()
                .skip(skip)
                .collect::<Vec<_>>()
                .join("\n");
        }
    }
}
