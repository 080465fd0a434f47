//! Utility modules for error handling, configuration and paths

pub mod config;
pub mod error;
pub mod format;
pub mod paths;
pub mod permissions;

// Re-export for convenience
pub use config::AppSettings;
pub use error::{ClipkeepError, DownloadError};
pub use paths::{get_app_data_dir, get_config_path, get_database_path, get_downloads_dir};
pub use permissions::Permissions;
