//! Request/response types exchanged with the extraction backend

use crate::utils::config::AppSettings;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Output file template, relative to the download directory.
pub const OUTPUT_TEMPLATE: &str = "%(title).100s.%(ext)s";

/// A URL plus the ordered option list handed to the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub url: String,
    options: Vec<(String, Option<String>)>,
}

impl ExtractionRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: Vec::new(),
        }
    }

    /// Append a bare flag such as `--no-playlist`.
    pub fn add_flag(&mut self, flag: &str) -> &mut Self {
        self.options.push((flag.to_string(), None));
        self
    }

    /// Append a flag with its value such as `--retries 3`.
    pub fn add_option(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.options.push((flag.to_string(), Some(value.into())));
        self
    }

    /// Value of the first occurrence of `flag`.
    pub fn option(&self, flag: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(f, _)| f == flag)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.options.iter().any(|(f, _)| f == flag)
    }

    /// Command-line arguments, URL last.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.options.len() * 2 + 1);
        for (flag, value) in &self.options {
            args.push(flag.clone());
            if let Some(value) = value {
                args.push(value.clone());
            }
        }
        args.push(self.url.clone());
        args
    }

    /// Deterministic download request for one format strategy.
    ///
    /// With `use_config_file` set and `<dir>/config.txt` present, the tuning
    /// options are replaced by `--config-location`; format, output template
    /// and progress reporting are always set.
    pub fn for_download(
        url: &str,
        download_dir: &Path,
        format: &str,
        settings: &AppSettings,
    ) -> Self {
        let mut request = Self::new(url);

        // Progress on its own lines, metadata JSON once the file is written
        request
            .add_flag("--newline")
            .add_flag("--print-json")
            .add_flag("--progress");

        let config_file = download_dir.join("config.txt");
        if settings.use_config_file && config_file.is_file() {
            request.add_option("--config-location", config_file.to_string_lossy());
        } else {
            request
                .add_flag("--no-mtime")
                .add_flag("--no-warnings")
                .add_flag("--ignore-errors")
                .add_flag("--no-cache-dir")
                .add_option("--socket-timeout", settings.socket_timeout_secs.to_string())
                .add_option("--retries", settings.retries.to_string())
                .add_option("--fragment-retries", settings.fragment_retries.to_string())
                .add_flag("--no-check-certificate")
                .add_flag("--no-playlist")
                .add_option("--user-agent", settings.user_agent.as_str());
        }

        request.add_option("-f", format).add_option(
            "-o",
            download_dir.join(OUTPUT_TEMPLATE).to_string_lossy(),
        );

        request
    }
}

/// Result of one tool run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResponse {
    pub exit_code: i32,
    pub out: String,
    pub err: String,
    pub elapsed: Duration,
}

impl ExtractionResponse {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Where a freshly downloaded file should be looked for when the tool
/// output did not name it.
pub fn fallback_file_path(download_dir: &Path, title: &str) -> PathBuf {
    download_dir.join(title)
}
