//! Device identity persistence (device.json).

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{DeviceId, WallClock};
use crate::paths;

use super::error::StoreError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceMeta {
    pub device_id: DeviceId,
    pub created_at_ms: u64,
}

/// Load the store's device identity, minting one on first open.
pub fn load_or_create(store_dir: &Path) -> Result<DeviceMeta, StoreError> {
    let path = paths::device_meta_path(store_dir);
    match fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
            StoreError::DeviceMetaCorrupt {
                path: path.clone(),
                source,
            }
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let meta = DeviceMeta {
                device_id: DeviceId::generate(),
                created_at_ms: WallClock::now().0,
            };
            write_atomic(&path, &meta)?;
            tracing::info!(device_id = %meta.device_id, "minted device identity");
            Ok(meta)
        }
        Err(source) => Err(StoreError::Io {
            path: path.clone(),
            source,
        }),
    }
}

fn write_atomic(path: &Path, meta: &DeviceMeta) -> Result<(), StoreError> {
    let io_err = |source: io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = path.parent().ok_or_else(|| {
        io_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "device meta path missing parent directory",
        ))
    })?;
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    serde_json::to_writer(temp.as_file(), meta).map_err(|source| StoreError::DeviceMetaCorrupt {
        path: path.to_path_buf(),
        source,
    })?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
