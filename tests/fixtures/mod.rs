#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::{Value, json};
use tempfile::TempDir;

use fieldsync::store::Limits;
use fieldsync::sync::{SendOutcome, SyncEnvelope, Transport, TransportError};
use fieldsync::{CancelToken, FieldRecordDraft, RecordId, RecordStore, WallClock};

pub fn open_store(temp: &TempDir) -> RecordStore {
    RecordStore::open(temp.path(), Limits::default()).expect("open store")
}

pub fn draft_at(captured_at_ms: u64, payload: Value) -> FieldRecordDraft {
    FieldRecordDraft {
        captured_at: Some(WallClock(captured_at_ms)),
        payload,
        ..FieldRecordDraft::default()
    }
}

pub fn draft(payload: Value) -> FieldRecordDraft {
    draft_at(WallClock::now().0, payload)
}

/// Commit a draft and queue it, returning its id.
pub fn queue_record(store: &RecordStore, draft: FieldRecordDraft) -> RecordId {
    let record = store.create(draft).expect("create record");
    store
        .mark_pending_sync(&record.record_id)
        .expect("queue record");
    record.record_id
}

/// One scripted server response.
#[derive(Clone, Debug)]
pub enum Step {
    Ack { server_version: u64 },
    AlreadyApplied { server_version: u64 },
    Conflict { server_version: u64 },
    Timeout,
    Unavailable,
}

/// Transport double that replays a script and logs every send.
///
/// When the script runs dry, sends are acked with incrementing server
/// versions starting at 1000.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<(RecordId, u64)>>,
    fallback_version: Mutex<u64>,
    /// Cancelled after each send, to model connectivity dying mid-cycle.
    pub cancel_after_send: Option<CancelToken>,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            sent: Mutex::new(Vec::new()),
            fallback_version: Mutex::new(999),
            cancel_after_send: None,
        }
    }

    pub fn acking() -> Self {
        Self::new([])
    }

    /// Every `(record_id, sync_version)` pair this transport saw, in order.
    pub fn sent(&self) -> Vec<(RecordId, u64)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        envelope: &SyncEnvelope,
        _timeout: std::time::Duration,
    ) -> Result<SendOutcome, TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((envelope.record_id.clone(), envelope.sync_version));

        if let Some(token) = &self.cancel_after_send {
            token.cancel();
        }

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Ack { server_version }) => Ok(SendOutcome::Ack { server_version }),
            Some(Step::AlreadyApplied { server_version }) => {
                Ok(SendOutcome::AlreadyApplied { server_version })
            }
            Some(Step::Conflict { server_version }) => Ok(SendOutcome::Conflict {
                server_version,
                server_snapshot: json!({ "source": "server", "version": server_version }),
            }),
            Some(Step::Timeout) => Err(TransportError::Timeout { waited_ms: 10_000 }),
            Some(Step::Unavailable) => Err(TransportError::Unavailable {
                reason: "no uplink".into(),
            }),
            None => {
                let mut version = self.fallback_version.lock().unwrap();
                *version += 1;
                Ok(SendOutcome::Ack {
                    server_version: *version,
                })
            }
        }
    }
}
