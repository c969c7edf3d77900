//! XDG directory helpers for config/data locations.

use std::path::{Path, PathBuf};

/// Base directory for persistent data (journal, task cache).
///
/// Uses `FIELDSYNC_DATA_DIR` if set, otherwise `$XDG_DATA_HOME/fieldsync`
/// or `~/.local/share/fieldsync`.
pub(crate) fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FIELDSYNC_DATA_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_DATA_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join("fieldsync")
}

/// Default record-store directory.
pub fn default_store_dir() -> PathBuf {
    data_dir().join("store")
}

/// Journal path inside a store directory.
pub(crate) fn journal_path(store_dir: &Path) -> PathBuf {
    store_dir.join("records.wal")
}

/// Store lock file path inside a store directory.
pub(crate) fn store_lock_path(store_dir: &Path) -> PathBuf {
    store_dir.join("store.lock")
}

/// Device identity path inside a store directory.
pub(crate) fn device_meta_path(store_dir: &Path) -> PathBuf {
    store_dir.join("device.json")
}

/// Cached task-assignment path inside a store directory.
pub(crate) fn task_cache_path(store_dir: &Path) -> PathBuf {
    store_dir.join("tasks.json")
}

/// Base directory for configuration files.
///
/// Uses `FIELDSYNC_CONFIG_DIR` if set, otherwise `$XDG_CONFIG_HOME/fieldsync`
/// or `~/.config/fieldsync`.
pub(crate) fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FIELDSYNC_CONFIG_DIR")
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }

    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".config")
        })
        .join("fieldsync")
}
