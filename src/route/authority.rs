//! Task supply: the central authority plus the offline cache.
//!
//! Assignments are fetched opportunistically while online and served
//! stale from the cache when the authority is unreachable.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::{AgentId, TaskId, VerificationTask};
use crate::error::{Effect, Transience};
use crate::paths;

/// The central authority, consumed behind an injected capability.
pub trait TaskAuthority {
    fn fetch_assigned_tasks(&self, agent: &AgentId) -> Result<Vec<VerificationTask>, AuthorityError>;
}

/// Authority fetch failures. All retriable: assignments are read-only
/// from this side.
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("authority unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("authority request timed out after {waited_ms}ms")]
    Timeout { waited_ms: u64 },
}

impl AuthorityError {
    pub fn transience(&self) -> Transience {
        Transience::Retryable
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}

#[derive(Debug, Error)]
pub enum TaskCacheError {
    #[error("task cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("task cache corrupted at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl TaskCacheError {
    pub fn transience(&self) -> Transience {
        match self {
            TaskCacheError::Io { .. } => Transience::Unknown,
            TaskCacheError::Corrupt { .. } => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            TaskCacheError::Io { .. } => Effect::Unknown,
            TaskCacheError::Corrupt { .. } => Effect::None,
        }
    }
}

/// Last-known assignment set, persisted atomically (tmp + rename) in the
/// store directory.
pub struct TaskCache {
    path: PathBuf,
}

impl TaskCache {
    pub fn in_store_dir(store_dir: &Path) -> Self {
        Self {
            path: paths::task_cache_path(store_dir),
        }
    }

    /// Load the cached assignments; an absent cache is an empty set.
    pub fn load(&self) -> Result<Vec<VerificationTask>, TaskCacheError> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| TaskCacheError::Corrupt {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(TaskCacheError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Fetch from the authority and persist; on a fetch failure the stale
    /// cache is returned instead. A successful fetch replaces the cache
    /// (revoked assignments drop out); reissued task ids within the fetch
    /// resolve by newest `issued_at_ms`.
    pub fn refresh(
        &self,
        authority: &dyn TaskAuthority,
        agent: &AgentId,
    ) -> Result<Vec<VerificationTask>, TaskCacheError> {
        match authority.fetch_assigned_tasks(agent) {
            Ok(fetched) => {
                let assignments = dedupe_latest(fetched);
                self.store(&assignments)?;
                Ok(assignments)
            }
            Err(err) => {
                tracing::info!("authority fetch failed, serving cached tasks: {err}");
                self.load()
            }
        }
    }

    fn store(&self, tasks: &[VerificationTask]) -> Result<(), TaskCacheError> {
        let io_err = |source: io::Error| TaskCacheError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = self.path.parent().ok_or_else(|| {
            io_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "task cache path missing parent directory",
            ))
        })?;
        fs::create_dir_all(dir).map_err(io_err)?;

        let temp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        serde_json::to_writer(temp.as_file(), tasks).map_err(|source| TaskCacheError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

fn dedupe_latest(fetched: Vec<VerificationTask>) -> Vec<VerificationTask> {
    use std::collections::BTreeMap;
    let mut by_id: BTreeMap<TaskId, VerificationTask> = BTreeMap::new();
    for task in fetched {
        match by_id.remove(&task.task_id) {
            Some(existing) => {
                let winner = VerificationTask::newer_of(existing, task);
                by_id.insert(winner.task_id.clone(), winner);
            }
            None => {
                by_id.insert(task.task_id.clone(), task);
            }
        }
    }
    by_id.into_values().collect()
}
