//! The FieldRecord: the artifact a completed (or partially completed)
//! verification produces, and its lifecycle state machine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::geo::Geotag;
use super::identity::{BlobRef, RecordId, TaskId};
use super::task::DocumentKind;
use super::time::WallClock;

/// Record lifecycle.
///
/// `Draft -> Captured -> PendingSync -> Syncing -> Synced`, with
/// `Syncing -> PendingSync` on transient failure and `Syncing -> Conflict`
/// on version mismatch. `Conflict` holds until a resolution policy
/// produces either a Synced record or a merged Draft successor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Draft,
    Captured,
    PendingSync,
    Syncing,
    Synced,
    Conflict,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Captured => "captured",
            Self::PendingSync => "pending_sync",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
        }
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (Draft, Captured)
                | (Draft, PendingSync)
                | (Captured, PendingSync)
                | (PendingSync, Syncing)
                | (Syncing, PendingSync)
                | (Syncing, Synced)
                | (Syncing, Conflict)
                | (Conflict, Synced)
        )
    }

    /// Terminal for local mutation: re-edits create a successor record.
    pub fn is_sealed(self) -> bool {
        matches!(self, Self::Synced | Self::Conflict)
    }
}

/// An attachment reference. Immutable once added: replacement means a new
/// attachment plus marking this one superseded, never in-place overwrite.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub blob: BlobRef,
    pub kind: DocumentKind,
    #[serde(default)]
    pub superseded: bool,
}

impl Attachment {
    pub fn new(blob: BlobRef, kind: DocumentKind) -> Self {
        Self {
            blob,
            kind,
            superseded: false,
        }
    }
}

/// Server-side state reported on a version-mismatch, kept with the record
/// until a resolution policy consumes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub server_version: u64,
    pub server_snapshot: Value,
}

/// A committed verification record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub record_id: RecordId,
    /// None for ad hoc records not tied to an assignment.
    pub task_id: Option<TaskId>,
    pub captured_at: WallClock,
    /// None if geotag capture failed.
    pub geotag: Option<Geotag>,
    pub attachments: Vec<Attachment>,
    pub payload: Value,
    pub lifecycle: LifecycleState,
    /// Strictly increases with every local edit; never decreases.
    pub sync_version: u64,
    /// Set once the server acknowledges this record.
    pub server_version: Option<u64>,
    /// Lineage link: the record this one re-edits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictInfo>,
}

impl FieldRecord {
    /// Attachment kinds currently in effect (superseded ones excluded).
    pub fn effective_document_kinds(&self) -> impl Iterator<Item = &DocumentKind> {
        self.attachments
            .iter()
            .filter(|a| !a.superseded)
            .map(|a| &a.kind)
    }
}

/// What a capture session hands to the store for committing.
///
/// `captured_at` is optional so callers that bypass the capture manager
/// still get a validation failure rather than a silent default.
#[derive(Clone, Debug, Default)]
pub struct FieldRecordDraft {
    pub task_id: Option<TaskId>,
    pub captured_at: Option<WallClock>,
    pub geotag: Option<Geotag>,
    pub attachments: Vec<Attachment>,
    pub payload: Value,
    pub supersedes: Option<RecordId>,
}

/// A local edit to an unsealed record. `None` fields are left untouched;
/// attachments are only ever appended or superseded.
#[derive(Clone, Debug, Default)]
pub struct RecordMutation {
    pub payload: Option<Value>,
    pub geotag: Option<Geotag>,
    pub add_attachments: Vec<Attachment>,
    /// Blob refs to mark superseded (their replacement goes in
    /// `add_attachments`).
    pub supersede_attachments: Vec<BlobRef>,
}
