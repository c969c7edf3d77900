//! Capture session manager: coordinates an in-progress field
//! verification and commits it atomically into the record store.
//!
//! A session accumulates geotag, attachments and payload in memory only -
//! nothing partial ever reaches the store. Commit consumes the session;
//! discard (or simply dropping it) releases everything. No session holds
//! device resources beyond its own lifetime.

use serde_json::Value;
use thiserror::Error;

use crate::core::{
    Attachment, BlobRef, DocumentKind, FieldRecord, FieldRecordDraft, GeoPoint, Geotag,
    VerificationTask, WallClock,
};
use crate::error::{Effect, Transience};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CaptureError {
    /// The originating task declared required document kinds that are not
    /// all present among active attachments. The caller decides whether
    /// to gather the rest or commit an explicitly-flagged incomplete
    /// record through the store API.
    #[error("capture incomplete: missing document kinds {missing:?}")]
    IncompleteCapture { missing: Vec<DocumentKind> },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CaptureError {
    pub fn transience(&self) -> Transience {
        match self {
            CaptureError::IncompleteCapture { .. } => Transience::Permanent,
            CaptureError::Store(e) => e.transience(),
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            CaptureError::IncompleteCapture { .. } => Effect::None,
            CaptureError::Store(e) => e.effect(),
        }
    }
}

/// An in-progress capture. Pure accumulation: no suspension, no storage.
#[derive(Debug)]
pub struct CaptureSession {
    task: Option<VerificationTask>,
    geotag: Option<Geotag>,
    attachments: Vec<Attachment>,
    payload: Value,
}

impl CaptureSession {
    pub fn task(&self) -> Option<&VerificationTask> {
        self.task.as_ref()
    }

    pub fn attach_geotag(&mut self, point: GeoPoint, accuracy_m: f64) {
        self.geotag = Some(Geotag::new(point, accuracy_m));
    }

    pub fn attach_document(&mut self, blob: BlobRef, kind: DocumentKind) {
        self.attachments.push(Attachment::new(blob, kind));
    }

    pub fn set_payload(&mut self, payload: Value) {
        self.payload = payload;
    }

    /// Document kinds the task still requires.
    pub fn missing_document_kinds(&self) -> Vec<DocumentKind> {
        let Some(task) = &self.task else {
            return Vec::new();
        };
        task.required_document_kinds
            .iter()
            .filter(|required| {
                !self
                    .attachments
                    .iter()
                    .any(|a| !a.superseded && a.kind == **required)
            })
            .cloned()
            .collect()
    }

    /// Release all in-memory capture state. Equivalent to dropping the
    /// session; spelled out for call sites that want the intent visible.
    pub fn discard(self) {
        drop(self);
    }
}

/// Opens sessions and commits them against the store.
#[derive(Clone)]
pub struct CaptureManager {
    store: RecordStore,
}

impl CaptureManager {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Open a capture session. `None` permits ad hoc records not tied to
    /// an assignment.
    pub fn begin_capture(&self, task: Option<VerificationTask>) -> CaptureSession {
        CaptureSession {
            task,
            geotag: None,
            attachments: Vec::new(),
            payload: Value::Null,
        }
    }

    /// Validate and commit the session as one durable record, then queue
    /// it for sync. The session is consumed either way; on error its
    /// state is gone and the store is untouched.
    pub fn commit(&self, session: CaptureSession) -> Result<FieldRecord, CaptureError> {
        let missing = session.missing_document_kinds();
        if !missing.is_empty() {
            return Err(CaptureError::IncompleteCapture { missing });
        }

        let record = self.store.create(FieldRecordDraft {
            task_id: session.task.map(|t| t.task_id),
            captured_at: Some(WallClock::now()),
            geotag: session.geotag,
            attachments: session.attachments,
            payload: session.payload,
            supersedes: None,
        })?;
        let queued = self.store.mark_pending_sync(&record.record_id)?;

        tracing::info!(record_id = %queued.record_id, "capture committed");
        Ok(queued)
    }
}
