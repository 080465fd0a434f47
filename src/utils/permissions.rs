//! Download preconditions
//!
//! A download may only start when the target directory is writable and the
//! settings allow network access.

use crate::utils::config::AppSettings;
use std::path::Path;
use tracing::{debug, warn};

/// Permissions a download attempt requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub storage: bool,
    pub network: bool,
}

impl Permissions {
    pub fn granted() -> Self {
        Self {
            storage: true,
            network: true,
        }
    }

    /// Probe the download directory and the network setting.
    ///
    /// Storage is granted when the directory can be created and a scratch
    /// file written and removed inside it.
    pub fn probe(download_dir: &Path, settings: &AppSettings) -> Self {
        Self {
            storage: probe_storage(download_dir),
            network: settings.allow_network,
        }
    }

    pub fn all_granted(&self) -> bool {
        self.storage && self.network
    }

    /// Names of the permissions that are missing.
    pub fn missing(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if !self.storage {
            missing.push("storage".to_string());
        }
        if !self.network {
            missing.push("network".to_string());
        }
        missing
    }
}

fn probe_storage(dir: &Path) -> bool {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Cannot create download directory {:?}: {}", dir, e);
        return false;
    }

    let probe = dir.join(".clipkeep-write-test");
    match std::fs::write(&probe, b"test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            debug!("Directory write test successful: {:?}", dir);
            true
        }
        Err(e) => {
            warn!("Directory write test failed for {:?}: {}", dir, e);
            false
        }
    }
}
