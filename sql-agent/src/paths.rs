//! Centralized path resolution.
//!
//! | Purpose | Linux | macOS | Windows |
//! |---------|-------|-------|---------|
//! | Config | `~/.config/sql-agent/` | `~/Library/Application Support/sql-agent/` | `%APPDATA%\sql-agent\` |

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Application name used in directory paths
const APP_NAME: &str = "sql-agent";

/// Settings file name inside the config directory
pub const SETTINGS_FILE: &str = "config.json";

/// Platform configuration directory, falling back to `~/.sql-agent/config`.
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .unwrap_or_else(|| fallback_base_dir().join("config"))
}

/// Default location of the persisted settings file.
pub fn get_settings_path() -> PathBuf {
    get_config_dir().join(SETTINGS_FILE)
}

/// `~/.sql-agent/`, or `./.sql-agent/` when there is no home directory.
fn fallback_base_dir() -> PathBuf {
    let dot_dir = format!(".{}", APP_NAME);
    dirs::home_dir().map(|p| p.join(&dot_dir)).unwrap_or_else(|| {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&dot_dir)
    })
}

/// Test if a directory is writable by creating and removing a probe file.
async fn has_write_access(dir: &Path) -> bool {
    if fs::create_dir_all(dir).await.is_err() {
        return false;
    }
    let probe = dir.join(format!(".write-test-{}", Uuid::new_v4()));
    match fs::write(&probe, b"test").await {
        Ok(_) => {
            let _ = fs::remove_file(&probe).await;
            true
        }
        Err(_) => false,
    }
}

/// Return `primary` if it is writable, else the first writable fallback
/// (`~/.sql-agent/<purpose>`, then `./.sql-agent/<purpose>`).
pub async fn ensure_writable_dir(primary: PathBuf, purpose: &str) -> Option<PathBuf> {
    if has_write_access(&primary).await {
        debug!("Using {:?} for {}", primary, purpose);
        return Some(primary);
    }
    warn!("Directory {:?} is not writable for {}", primary, purpose);

    let dot_dir = format!(".{}", APP_NAME);
    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(&dot_dir).join(purpose));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(&dot_dir).join(purpose));
    }

    for candidate in candidates {
        if has_write_access(&candidate).await {
            warn!("Using fallback {:?} for {}", candidate, purpose);
            return Some(candidate);
        }
    }
    None
}
