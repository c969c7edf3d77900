//! Sync dispatcher error types.
//!
//! Transport failures and conflicts never surface here - they are
//! recorded in record lifecycle state and retry metadata. This error is
//! the programming/storage surface of a cycle.

use thiserror::Error;

use crate::core::RecordId;
use crate::error::{Effect, Transience};
use crate::store::StoreError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode payload for {id}: {source}")]
    Encode {
        id: RecordId,
        #[source]
        source: serde_json::Error,
    },
}

impl SyncError {
    pub fn transience(&self) -> Transience {
        match self {
            SyncError::Store(e) => e.transience(),
            SyncError::Encode { .. } => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            SyncError::Store(e) => e.effect(),
            SyncError::Encode { .. } => Effect::None,
        }
    }
}
