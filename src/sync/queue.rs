//! The sync queue: ephemeral per-record retry state.
//!
//! Entries are derived from records whose lifecycle is `PendingSync` and
//! are never persisted independently - after a process restart the queue
//! rebuilds from the store with attempt counts reset to zero (backoff is
//! best-effort, not required to survive restarts).

use std::collections::BTreeMap;

use crate::core::{FieldRecord, RecordId, WallClock};

#[derive(Clone, Debug)]
pub struct SyncQueueEntry {
    pub record_id: RecordId,
    pub captured_at: WallClock,
    pub attempt: u32,
    pub next_eligible_at: WallClock,
    pub last_error: Option<String>,
}

#[derive(Default)]
pub(crate) struct SyncQueue {
    entries: BTreeMap<RecordId, SyncQueueEntry>,
}

impl SyncQueue {
    /// Reconcile with the store's pending set: new records enter with a
    /// zero attempt count, records no longer pending drop out, records
    /// still pending keep their retry state.
    pub fn refresh(&mut self, pending: &[FieldRecord]) {
        let mut next = BTreeMap::new();
        for record in pending {
            let entry = self
                .entries
                .remove(&record.record_id)
                .unwrap_or_else(|| SyncQueueEntry {
                    record_id: record.record_id.clone(),
                    captured_at: record.captured_at,
                    attempt: 0,
                    next_eligible_at: WallClock(0),
                    last_error: None,
                });
            next.insert(record.record_id.clone(), entry);
        }
        self.entries = next;
    }

    pub fn entry(&self, id: &RecordId) -> Option<&SyncQueueEntry> {
        self.entries.get(id)
    }

    pub fn entry_mut(&mut self, id: &RecordId) -> Option<&mut SyncQueueEntry> {
        self.entries.get_mut(id)
    }

    pub fn remove(&mut self, id: &RecordId) {
        self.entries.remove(id);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any entry has exhausted its attempt budget.
    pub fn any_exhausted(&self, max_attempts: u32) -> bool {
        self.entries.values().any(|e| e.attempt >= max_attempts)
    }
}
