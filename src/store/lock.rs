//! Store lock handling: one process owns a store directory at a time.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{DeviceId, WallClock};
use crate::paths;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLockMeta {
    pub device_id: DeviceId,
    pub pid: u32,
    pub started_at_ms: u64,
    pub version: String,
}

impl StoreLockMeta {
    fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            pid: std::process::id(),
            started_at_ms: WallClock::now().0,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    released: bool,
}

impl StoreLock {
    pub fn acquire(store_dir: &Path, device_id: DeviceId) -> Result<Self, StoreLockError> {
        let path = paths::store_lock_path(store_dir);
        reject_symlink(&path)?;

        let meta = StoreLockMeta::new(device_id);

        let mut file = match open_new_lock_file(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let holder = read_metadata(&path).ok();
                return Err(StoreLockError::Held {
                    path: Box::new(path),
                    holder: holder.map(Box::new),
                });
            }
            Err(err) => return Err(StoreLockError::Io(err)),
        };

        serde_json::to_writer(&mut file, &meta)
            .map_err(|source| StoreLockError::MetadataCorrupt {
                path: path.clone(),
                source,
            })?;
        file.sync_all()?;

        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<(), StoreLockError> {
        if !self.released {
            fs::remove_file(&self.path)?;
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreLockError {
    #[error("store lock already held at {path:?}")]
    Held {
        path: Box<PathBuf>,
        holder: Option<Box<StoreLockMeta>>,
    },
    #[error("store lock path is a symlink: {path:?}")]
    Symlink { path: PathBuf },
    #[error("lock metadata corrupted at {path:?}: {source}")]
    MetadataCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

fn reject_symlink(path: &Path) -> Result<(), StoreLockError> {
    if let Ok(meta) = fs::symlink_metadata(path)
        && meta.file_type().is_symlink()
    {
        return Err(StoreLockError::Symlink {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn read_metadata(path: &Path) -> Result<StoreLockMeta, StoreLockError> {
    reject_symlink(path)?;
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| StoreLockError::MetadataCorrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn open_new_lock_file(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}
