//! Record store error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::{CoreError, LifecycleState, RecordId};
use crate::error::{Effect, Transience};

use super::journal::JournalError;
use super::lock::StoreLockError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("record not found: {id}")]
    NotFound { id: RecordId },

    #[error("record {id} is {state:?}: {operation} not allowed")]
    InvalidState {
        id: RecordId,
        state: LifecycleState,
        operation: &'static str,
    },

    #[error("record {id}: illegal transition {from:?} -> {to:?}")]
    InvalidTransition {
        id: RecordId,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("storage exhausted: {limit} at {max} (got {got})")]
    StorageExhausted {
        limit: &'static str,
        max: u64,
        got: u64,
    },

    #[error(transparent)]
    Lock(#[from] StoreLockError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("device metadata corrupted at {path:?}: {source}")]
    DeviceMetaCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("store io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Whether retrying this operation may succeed.
    pub fn transience(&self) -> Transience {
        match self {
            // Another process may release the lock.
            StoreError::Lock(StoreLockError::Held { .. }) => Transience::Retryable,

            StoreError::Journal(e) => e.transience(),
            StoreError::Io { .. } => Transience::Unknown,

            // Usage and capacity errors need a changed input or freed space.
            StoreError::Core(_)
            | StoreError::NotFound { .. }
            | StoreError::InvalidState { .. }
            | StoreError::InvalidTransition { .. }
            | StoreError::StorageExhausted { .. }
            | StoreError::Lock(_)
            | StoreError::DeviceMetaCorrupt { .. } => Transience::Permanent,
        }
    }

    /// What we know about side effects when this error is returned.
    pub fn effect(&self) -> Effect {
        match self {
            // Validation happens before the journal is touched.
            StoreError::Core(_)
            | StoreError::NotFound { .. }
            | StoreError::InvalidState { .. }
            | StoreError::InvalidTransition { .. }
            | StoreError::StorageExhausted { .. }
            | StoreError::Lock(_)
            | StoreError::DeviceMetaCorrupt { .. } => Effect::None,

            StoreError::Journal(e) => e.effect(),
            StoreError::Io { .. } => Effect::Unknown,
        }
    }
}
