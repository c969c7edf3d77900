use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::error::{Effect, Transience};

use super::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

impl ConfigError {
    pub fn transience(&self) -> Transience {
        match self {
            ConfigError::Read { .. } | ConfigError::Write { .. } => Transience::Unknown,
            ConfigError::Parse { .. } => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            ConfigError::Write { .. } => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

pub fn config_path() -> PathBuf {
    crate::paths::config_dir().join("config.toml")
}

/// Load the config at `path`; a missing file yields the defaults.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the user config, falling back to defaults on any failure.
pub fn load_or_default() -> Config {
    let path = config_path();
    match load_from(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("config load failed, using defaults: {e}");
            Config::default()
        }
    }
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    let write_err = |reason: String| ConfigError::Write {
        path: path.to_path_buf(),
        reason,
    };

    let dir = path
        .parent()
        .ok_or_else(|| write_err("config path missing parent directory".to_string()))?;
    fs::create_dir_all(dir).map_err(|e| write_err(format!("failed to create dir: {e}")))?;

    let contents =
        toml::to_string_pretty(cfg).map_err(|e| write_err(format!("failed to render: {e}")))?;

    let temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| write_err(format!("failed to create temp file: {e}")))?;
    fs::write(temp.path(), contents.as_bytes())
        .map_err(|e| write_err(format!("failed to write temp file: {e}")))?;
    temp.persist(path)
        .map_err(|e| write_err(format!("failed to persist: {e}")))?;
    Ok(())
}
