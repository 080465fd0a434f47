//! Application configuration

use crate::utils::error::ClipkeepError;
use crate::utils::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default format-selection strategies, most compatible first.
pub const DEFAULT_FORMAT_STRATEGIES: [&str; 4] = [
    "best[ext=mp4]/bestvideo[ext=mp4]+bestaudio[ext=m4a]/bestvideo+bestaudio/best",
    "best[height<=720][ext=mp4]/best[height<=720]",
    "bestvideo[height<=720]+bestaudio/best[height<=720]",
    "mp4/best",
];

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 11; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.120 Mobile Safari/537.36";

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Download location
    pub download_location: PathBuf,

    /// Catalog database file
    pub database_path: PathBuf,

    /// Explicit yt-dlp binary, skipping discovery
    pub ytdlp_path: Option<PathBuf>,

    /// Format-selection strategies tried in order
    pub format_strategies: Vec<String>,

    /// Socket timeout passed to the extraction tool (seconds)
    pub socket_timeout_secs: u32,

    /// Retry attempts for the whole download
    pub retries: u32,

    /// Retry attempts per fragment
    pub fragment_retries: u32,

    pub user_agent: String,

    /// Use `config.txt` in the download directory instead of the built-in options
    pub use_config_file: bool,

    /// Network access granted to the downloader
    pub allow_network: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            download_location: paths::get_downloads_dir(),
            database_path: paths::get_database_path(),
            ytdlp_path: None,
            format_strategies: DEFAULT_FORMAT_STRATEGIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            socket_timeout_secs: 30,
            retries: 3,
            fragment_retries: 3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            use_config_file: false,
            allow_network: true,
        }
    }
}

impl AppSettings {
    /// Load settings from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ClipkeepError> {
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: AppSettings = serde_json::from_str(&content)?;
        info!("Loaded settings from {:?}", path);
        Ok(settings.sanitized())
    }

    /// Write settings as pretty JSON, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<(), ClipkeepError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Strategy list actually used; an empty list falls back to the defaults.
    pub fn strategies(&self) -> Vec<String> {
        if self.format_strategies.is_empty() {
            DEFAULT_FORMAT_STRATEGIES
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.format_strategies.clone()
        }
    }

    fn sanitized(mut self) -> Self {
        // Enforce sane minimums
        if self.socket_timeout_secs == 0 {
            self.socket_timeout_secs = 30;
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = DEFAULT_USER_AGENT.to_string();
        }
        self
    }
}
