//! Platform path resolution
//!
//! Every path clipkeep uses is resolved to an absolute location from the
//! platform conventions exposed by `dirs`, never from the current working
//! directory:
//! - Data: `<data dir>/clipkeep/` (catalog database)
//! - Config: `<config dir>/clipkeep/settings.json`
//! - Downloads: `<Movies>/VideoDownloader/`

use std::path::PathBuf;
use tracing::{debug, warn};

const APP_DIR: &str = "clipkeep";
const DOWNLOAD_FOLDER: &str = "VideoDownloader";

/// Get the application data directory, creating it if needed.
pub fn get_app_data_dir() -> PathBuf {
    let dir = dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR);

    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Failed to create data directory {:?}: {}", dir, e);
    }

    debug!("App data directory: {:?}", dir);
    dir
}

/// Default catalog database location: `<data dir>/clipkeep/catalog.db`
pub fn get_database_path() -> PathBuf {
    get_app_data_dir().join("catalog.db")
}

/// Default settings file location: `<config dir>/clipkeep/settings.json`
pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(get_app_data_dir)
        .join(APP_DIR)
        .join("settings.json")
}

/// Default download directory.
///
/// Prefers the platform video directory, then Downloads, then the home
/// directory.
pub fn get_downloads_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::download_dir)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| {
            warn!("Could not determine a video directory, using temp dir");
            std::env::temp_dir()
        })
        .join(DOWNLOAD_FOLDER)
}
