//! The network boundary, injected as a capability so tests swap in a
//! scripted double.

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

use crate::core::{Attachment, FieldRecord, RecordId, WallClock};
use crate::error::{Effect, Transience};

use super::error::SyncError;

/// One record's worth of wire state. `record_id` + `sync_version` is the
/// idempotency key: the server contract requires retries of an
/// already-applied pair to be safely ignorable.
#[derive(Clone, Debug)]
pub struct SyncEnvelope {
    pub record_id: RecordId,
    pub sync_version: u64,
    pub captured_at: WallClock,
    pub supersedes: Option<RecordId>,
    /// Active attachment references; blob bytes travel out of band.
    pub attachments: Vec<Attachment>,
    /// Canonical JSON payload bytes. Bytes so retries clone cheaply.
    pub body: Bytes,
}

impl SyncEnvelope {
    pub fn for_record(record: &FieldRecord) -> Result<Self, SyncError> {
        let body = serde_json::to_vec(&record.payload).map_err(|source| SyncError::Encode {
            id: record.record_id.clone(),
            source,
        })?;
        Ok(Self {
            record_id: record.record_id.clone(),
            sync_version: record.sync_version,
            captured_at: record.captured_at,
            supersedes: record.supersedes.clone(),
            attachments: record
                .attachments
                .iter()
                .filter(|a| !a.superseded)
                .cloned()
                .collect(),
            body: Bytes::from(body),
        })
    }
}

/// Server response to a transmission.
#[derive(Clone, Debug, PartialEq)]
pub enum SendOutcome {
    /// Applied; the server assigned this canonical version.
    Ack { server_version: u64 },
    /// This `(record_id, sync_version)` was applied by an earlier attempt
    /// whose response was lost. Treated identically to `Ack`.
    AlreadyApplied { server_version: u64 },
    /// The server holds a newer version for this lineage than the client
    /// assumed.
    Conflict {
        server_version: u64,
        server_snapshot: Value,
    },
}

/// Transmission failures worth retrying.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send timed out after {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    #[error("transport unavailable: {reason}")]
    Unavailable { reason: String },
}

impl TransportError {
    pub fn transience(&self) -> Transience {
        Transience::Retryable
    }

    pub fn effect(&self) -> Effect {
        match self {
            // The server may have applied the write before the deadline;
            // the idempotency contract makes the retry safe.
            TransportError::Timeout { .. } => Effect::Unknown,
            TransportError::Unavailable { .. } => Effect::None,
        }
    }
}

/// The injected network capability.
///
/// `timeout` bounds the whole send; an implementation that cannot finish
/// within it returns `TransportError::Timeout` rather than leaving the
/// record indeterminate.
pub trait Transport {
    fn send(
        &self,
        envelope: &SyncEnvelope,
        timeout: std::time::Duration,
    ) -> Result<SendOutcome, TransportError>;
}
