//! Durable record store: the single owner of FieldRecord persistence and
//! the only writer of lifecycle transitions.
//!
//! All mutations append to a crc32c-framed journal before becoming
//! visible, so a crash at any point leaves either the old or the new
//! version of a record, never a mixture. Mutations are serialized at the
//! journal; reads share an RwLock and never block each other.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{
    ConflictInfo, DeviceId, FieldRecord, FieldRecordDraft, InvalidId, LifecycleState, MissingField,
    RecordId, RecordMutation, WallClock,
};
use crate::paths;

mod device;
mod error;
mod journal;
mod lock;

pub use error::StoreError;
pub use journal::{JournalEntry, JournalError};
pub use lock::{StoreLock, StoreLockError, StoreLockMeta};

pub type StoreResult<T> = Result<T, StoreError>;

/// Capacity bounds for the local store. Capture fails fast against these
/// rather than attempting a doomed partial write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_records: usize,
    pub max_payload_bytes: usize,
    pub max_attachments_per_record: usize,
    pub max_journal_bytes: u64,
    pub max_entry_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_records: 10_000,
            max_payload_bytes: 256 * 1024,
            max_attachments_per_record: 32,
            max_journal_bytes: 64 * 1024 * 1024,
            max_entry_bytes: 1024 * 1024,
        }
    }
}

/// Counts per lifecycle state, for the asynchronous status surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub drafts: usize,
    pub captured: usize,
    pub pending_sync: usize,
    pub syncing: usize,
    pub synced: usize,
    pub conflicts: usize,
    /// Set by the dispatcher once a pending record exhausts its attempt
    /// budget; cleared when the queue drains or progresses again.
    pub sync_stalled: bool,
}

/// How to resolve a record stuck in `Conflict`.
///
/// Policy is deliberately pluggable: the store offers the two mechanical
/// outcomes and the caller (human or automated) picks. Neither outcome
/// silently drops local capture data - `AcceptServer` is an explicit
/// discard decision, `RetryMerged` carries the local changes forward.
#[derive(Clone, Debug)]
pub enum ConflictResolution {
    /// Accept the server snapshot; the local edit is discarded by choice.
    AcceptServer,
    /// Re-apply local changes on top of the server state: the conflicted
    /// record seals at the server version and a new draft carrying
    /// `merged_payload` supersedes it.
    RetryMerged { merged_payload: Value },
}

struct Shared {
    device: DeviceId,
    limits: Limits,
    records: RwLock<BTreeMap<RecordId, FieldRecord>>,
    journal: Mutex<journal::Journal>,
    next_counter: AtomicU64,
    sync_stalled: AtomicBool,
    _lock: StoreLock,
}

/// Handle to an open store. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct RecordStore {
    shared: Arc<Shared>,
}

impl RecordStore {
    /// Open (creating if absent) the store at `dir` and replay its journal.
    ///
    /// Recovery: a torn journal tail is truncated, and any record left in
    /// `Syncing` by a crash is reverted to `PendingSync` - in-flight
    /// dispatch state is not durable.
    pub fn open(dir: &Path, limits: Limits) -> StoreResult<Self> {
        fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let device_meta = device::load_or_create(dir)?;
        let lock = StoreLock::acquire(dir, device_meta.device_id)?;

        let (mut journal, replay) =
            journal::open(&paths::journal_path(dir), limits.max_entry_bytes)?;

        let mut records: BTreeMap<RecordId, FieldRecord> = BTreeMap::new();
        for entry in replay.entries {
            records.insert(entry.record.record_id.clone(), entry.record);
        }

        // Revert interrupted dispatches.
        let now_ms = WallClock::now().0;
        for record in records.values_mut() {
            if record.lifecycle == LifecycleState::Syncing {
                record.lifecycle = LifecycleState::PendingSync;
                journal.append(&JournalEntry {
                    at_ms: now_ms,
                    record: record.clone(),
                })?;
                tracing::info!(record_id = %record.record_id, "reverted interrupted sync to pending");
            }
        }

        let next_counter = records
            .keys()
            .filter(|id| id.device() == device_meta.device_id)
            .map(RecordId::counter)
            .max()
            .unwrap_or(0);

        tracing::debug!(
            records = records.len(),
            device_id = %device_meta.device_id,
            "record store opened"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                device: device_meta.device_id,
                limits,
                records: RwLock::new(records),
                journal: Mutex::new(journal),
                next_counter: AtomicU64::new(next_counter),
                sync_stalled: AtomicBool::new(false),
                _lock: lock,
            }),
        })
    }

    /// Open the store at the default XDG data location.
    pub fn open_default(limits: Limits) -> StoreResult<Self> {
        Self::open(&paths::default_store_dir(), limits)
    }

    pub fn device_id(&self) -> DeviceId {
        self.shared.device
    }

    /// Commit a new record. Durably persisted before this returns.
    ///
    /// The record starts at `Captured` with `sync_version` 1.
    pub fn create(&self, draft: FieldRecordDraft) -> StoreResult<FieldRecord> {
        self.create_with_state(draft, LifecycleState::Captured)
    }

    fn create_with_state(
        &self,
        draft: FieldRecordDraft,
        lifecycle: LifecycleState,
    ) -> StoreResult<FieldRecord> {
        let captured_at = draft
            .captured_at
            .ok_or(MissingField {
                field: "captured_at",
            })
            .map_err(crate::core::CoreError::from)?;
        self.check_payload_size(&draft.payload)?;
        if draft.attachments.len() > self.shared.limits.max_attachments_per_record {
            return Err(StoreError::StorageExhausted {
                limit: "max_attachments_per_record",
                max: self.shared.limits.max_attachments_per_record as u64,
                got: draft.attachments.len() as u64,
            });
        }

        let mut journal = self.lock_journal();

        {
            let records = self.read_records();
            if records.len() >= self.shared.limits.max_records {
                return Err(StoreError::StorageExhausted {
                    limit: "max_records",
                    max: self.shared.limits.max_records as u64,
                    got: records.len() as u64,
                });
            }
        }
        if journal.bytes() >= self.shared.limits.max_journal_bytes {
            return Err(StoreError::StorageExhausted {
                limit: "max_journal_bytes",
                max: self.shared.limits.max_journal_bytes,
                got: journal.bytes(),
            });
        }

        let counter = self.shared.next_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let record = FieldRecord {
            record_id: RecordId::new(self.shared.device, counter),
            task_id: draft.task_id,
            captured_at,
            geotag: draft.geotag,
            attachments: draft.attachments,
            payload: draft.payload,
            lifecycle,
            sync_version: 1,
            server_version: None,
            supersedes: draft.supersedes,
            conflict: None,
        };

        journal.append(&JournalEntry {
            at_ms: WallClock::now().0,
            record: record.clone(),
        })?;
        self.write_records()
            .insert(record.record_id.clone(), record.clone());

        tracing::debug!(record_id = %record.record_id, "record created");
        Ok(record)
    }

    /// Apply a local edit. Fails on sealed records (`Synced`, `Conflict`)
    /// and on records currently in flight (`Syncing`). Increments
    /// `sync_version` atomically with the durable write.
    pub fn update(&self, id: &RecordId, mutation: RecordMutation) -> StoreResult<FieldRecord> {
        let mut journal = self.lock_journal();
        let mut record = self.get_locked(id)?;

        match record.lifecycle {
            LifecycleState::Draft | LifecycleState::Captured | LifecycleState::PendingSync => {}
            state => {
                return Err(StoreError::InvalidState {
                    id: id.clone(),
                    state,
                    operation: "update",
                });
            }
        }

        if let Some(payload) = mutation.payload {
            self.check_payload_size(&payload)?;
            record.payload = payload;
        }
        if let Some(geotag) = mutation.geotag {
            record.geotag = Some(geotag);
        }
        for blob in &mutation.supersede_attachments {
            let attachment = record
                .attachments
                .iter_mut()
                .find(|a| a.blob == *blob && !a.superseded)
                .ok_or_else(|| {
                    crate::core::CoreError::from(InvalidId::Blob {
                        raw: blob.to_hex(),
                        reason: format!("not an active attachment of {id}"),
                    })
                })?;
            attachment.superseded = true;
        }
        record.attachments.extend(mutation.add_attachments);
        if record.attachments.len() > self.shared.limits.max_attachments_per_record {
            return Err(StoreError::StorageExhausted {
                limit: "max_attachments_per_record",
                max: self.shared.limits.max_attachments_per_record as u64,
                got: record.attachments.len() as u64,
            });
        }

        record.sync_version += 1;

        journal.append(&JournalEntry {
            at_ms: WallClock::now().0,
            record: record.clone(),
        })?;
        self.write_records().insert(id.clone(), record.clone());
        Ok(record)
    }

    /// Queue a committed record for transmission.
    pub fn mark_pending_sync(&self, id: &RecordId) -> StoreResult<FieldRecord> {
        self.apply_transition(id, LifecycleState::PendingSync, |_| {})
    }

    /// Dispatcher API: claim a pending record for an in-flight send.
    pub fn begin_syncing(&self, id: &RecordId) -> StoreResult<FieldRecord> {
        self.apply_transition(id, LifecycleState::Syncing, |_| {})
    }

    /// Dispatcher API: return an in-flight record to the queue (transient
    /// failure or cancelled cycle).
    pub fn revert_syncing(&self, id: &RecordId) -> StoreResult<FieldRecord> {
        self.apply_transition(id, LifecycleState::PendingSync, |_| {})
    }

    /// Record the server acknowledgment. The record seals: no further
    /// local mutation is accepted.
    pub fn mark_synced(&self, id: &RecordId, server_version: u64) -> StoreResult<FieldRecord> {
        self.apply_transition(id, LifecycleState::Synced, |record| {
            record.server_version = Some(server_version);
            record.conflict = None;
        })
    }

    /// Record a server-reported version mismatch. The record holds in
    /// `Conflict` until a resolution policy consumes it.
    pub fn mark_conflict(
        &self,
        id: &RecordId,
        server_version: u64,
        server_snapshot: Value,
    ) -> StoreResult<FieldRecord> {
        self.apply_transition(id, LifecycleState::Conflict, |record| {
            record.conflict = Some(ConflictInfo {
                server_version,
                server_snapshot,
            });
        })
    }

    /// Resolve a conflicted record. Returns the record to act on next:
    /// the sealed record for `AcceptServer`, the new merged draft for
    /// `RetryMerged` (callers queue it with `mark_pending_sync`).
    pub fn resolve_conflict(
        &self,
        id: &RecordId,
        resolution: ConflictResolution,
    ) -> StoreResult<FieldRecord> {
        let current = self.get(id)?;
        if current.lifecycle != LifecycleState::Conflict {
            return Err(StoreError::InvalidState {
                id: id.clone(),
                state: current.lifecycle,
                operation: "resolve_conflict",
            });
        }
        let info = current.conflict.clone().ok_or(StoreError::InvalidState {
            id: id.clone(),
            state: current.lifecycle,
            operation: "resolve_conflict",
        })?;

        match resolution {
            ConflictResolution::AcceptServer => {
                self.apply_transition(id, LifecycleState::Synced, |record| {
                    record.payload = info.server_snapshot.clone();
                    record.server_version = Some(info.server_version);
                    record.conflict = None;
                })
            }
            ConflictResolution::RetryMerged { merged_payload } => {
                // Persist the successor before sealing the original: a
                // crash between the two writes must never lose the merge.
                let successor = self.create_with_state(
                    FieldRecordDraft {
                        task_id: current.task_id.clone(),
                        captured_at: Some(WallClock::now()),
                        geotag: current.geotag,
                        attachments: current.attachments.clone(),
                        payload: merged_payload,
                        supersedes: Some(id.clone()),
                    },
                    LifecycleState::Draft,
                )?;
                // The server state stands for this lineage point.
                self.apply_transition(id, LifecycleState::Synced, |record| {
                    record.payload = info.server_snapshot.clone();
                    record.server_version = Some(info.server_version);
                    record.conflict = None;
                })?;
                Ok(successor)
            }
        }
    }

    /// Records awaiting transmission, oldest capture first. Snapshot
    /// semantics: the returned set reflects the store at call time.
    pub fn list_pending(&self) -> Vec<FieldRecord> {
        let records = self.read_records();
        let mut pending: Vec<FieldRecord> = records
            .values()
            .filter(|r| r.lifecycle == LifecycleState::PendingSync)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.captured_at
                .cmp(&b.captured_at)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        pending
    }

    pub fn get(&self, id: &RecordId) -> StoreResult<FieldRecord> {
        self.read_records()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })
    }

    /// Asynchronous status surface for the UI layer: lifecycle counts
    /// plus the stalled-sync flag. Never blocks on the journal.
    pub fn status(&self) -> StoreStatus {
        let records = self.read_records();
        let mut status = StoreStatus {
            sync_stalled: self.shared.sync_stalled.load(Ordering::Relaxed),
            ..StoreStatus::default()
        };
        for record in records.values() {
            match record.lifecycle {
                LifecycleState::Draft => status.drafts += 1,
                LifecycleState::Captured => status.captured += 1,
                LifecycleState::PendingSync => status.pending_sync += 1,
                LifecycleState::Syncing => status.syncing += 1,
                LifecycleState::Synced => status.synced += 1,
                LifecycleState::Conflict => status.conflicts += 1,
            }
        }
        status
    }

    pub(crate) fn set_sync_stalled(&self, stalled: bool) {
        self.shared.sync_stalled.store(stalled, Ordering::Relaxed);
    }

    fn apply_transition(
        &self,
        id: &RecordId,
        to: LifecycleState,
        apply: impl FnOnce(&mut FieldRecord),
    ) -> StoreResult<FieldRecord> {
        let mut journal = self.lock_journal();
        let mut record = self.get_locked(id)?;

        let from = record.lifecycle;
        if !from.can_transition(to) {
            return Err(StoreError::InvalidTransition {
                id: id.clone(),
                from,
                to,
            });
        }
        record.lifecycle = to;
        apply(&mut record);

        journal.append(&JournalEntry {
            at_ms: WallClock::now().0,
            record: record.clone(),
        })?;
        self.write_records().insert(id.clone(), record.clone());

        tracing::trace!(record_id = %id, from = from.as_str(), to = to.as_str(), "lifecycle transition");
        Ok(record)
    }

    fn check_payload_size(&self, payload: &Value) -> StoreResult<()> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|source| JournalError::EntryEncode { source })?
            .len();
        if bytes > self.shared.limits.max_payload_bytes {
            return Err(StoreError::StorageExhausted {
                limit: "max_payload_bytes",
                max: self.shared.limits.max_payload_bytes as u64,
                got: bytes as u64,
            });
        }
        Ok(())
    }

    /// Read a record while the journal lock is held (mutation path).
    fn get_locked(&self, id: &RecordId) -> StoreResult<FieldRecord> {
        self.read_records()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })
    }

    fn lock_journal(&self) -> std::sync::MutexGuard<'_, journal::Journal> {
        self.shared.journal.lock().expect("journal lock poisoned")
    }

    fn read_records(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<RecordId, FieldRecord>> {
        self.shared.records.read().expect("records lock poisoned")
    }

    fn write_records(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<RecordId, FieldRecord>> {
        self.shared.records.write().expect("records lock poisoned")
    }
}
