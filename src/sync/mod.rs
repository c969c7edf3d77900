//! Sync queue and dispatcher.
//!
//! `run_sync_cycle` walks the pending set oldest-capture-first, pushes
//! each record through the injected transport, and requests lifecycle
//! transitions from the store - it never touches storage directly.
//! Interested layers (capture UI, scheduler) subscribe to a channel of
//! `SyncEvent`s rather than polling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{Receiver, Sender, unbounded};

use crate::config::SyncConfig;
use crate::core::{LifecycleState, RecordId, WallClock};
use crate::store::{RecordStore, StoreError};

mod backoff;
mod error;
mod queue;
mod transport;

pub use backoff::BackoffPolicy;
pub use error::SyncError;
pub use queue::SyncQueueEntry;
pub use transport::{SendOutcome, SyncEnvelope, Transport, TransportError};

pub type SyncResult<T> = Result<T, SyncError>;

/// Cooperative cancellation, checked at per-record boundaries.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Per-record outcome of one cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordOutcome {
    Synced { server_version: u64 },
    Conflicted { server_version: u64 },
    Retried { attempt: u32 },
    /// Backoff timer not yet elapsed.
    DeferredBackoff,
    /// Predecessor in this record's lineage has no known outcome yet.
    DeferredLineage,
}

#[derive(Clone, Debug, Default)]
pub struct SyncCycleReport {
    pub synced: usize,
    pub conflicts: usize,
    pub retried: usize,
    pub deferred: usize,
    pub cancelled: bool,
    pub outcomes: Vec<(RecordId, RecordOutcome)>,
}

/// Broadcast to subscribed layers as the dispatcher works.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    RecordSynced {
        record_id: RecordId,
        server_version: u64,
    },
    RecordConflicted {
        record_id: RecordId,
        server_version: u64,
    },
    RecordRetried {
        record_id: RecordId,
        attempt: u32,
        next_eligible_at: WallClock,
    },
    CycleFinished {
        synced: usize,
        conflicts: usize,
        retried: usize,
        deferred: usize,
        cancelled: bool,
    },
}

pub struct SyncDispatcher {
    store: RecordStore,
    policy: BackoffPolicy,
    max_attempts: u32,
    send_timeout: std::time::Duration,
    queue: queue::SyncQueue,
    subscribers: Vec<Sender<SyncEvent>>,
}

impl SyncDispatcher {
    /// Attempt counts live here, not in the store: recreating the
    /// dispatcher (process restart) resets backoff, by contract.
    pub fn new(store: RecordStore, config: &SyncConfig) -> Self {
        Self {
            store,
            policy: BackoffPolicy::from_config(config),
            max_attempts: config.max_attempts,
            send_timeout: std::time::Duration::from_millis(config.send_timeout_ms),
            queue: queue::SyncQueue::default(),
            subscribers: Vec::new(),
        }
    }

    /// Subscribe to dispatcher events. Dropped receivers are pruned on
    /// the next publish.
    pub fn subscribe(&mut self) -> Receiver<SyncEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Run one sync cycle. Invoked when connectivity appears
    /// (edge-triggered) or periodically while online.
    pub fn run_sync_cycle(
        &mut self,
        transport: &dyn Transport,
        cancel: &CancelToken,
    ) -> SyncResult<SyncCycleReport> {
        self.run_sync_cycle_at(transport, cancel, WallClock::now())
    }

    /// As `run_sync_cycle`, with an explicit clock for backoff
    /// eligibility (tests drive time through here).
    pub fn run_sync_cycle_at(
        &mut self,
        transport: &dyn Transport,
        cancel: &CancelToken,
        now: WallClock,
    ) -> SyncResult<SyncCycleReport> {
        let pending = self.store.list_pending();
        self.queue.refresh(&pending);

        let mut report = SyncCycleReport::default();

        for (index, record) in pending.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.deferred += pending.len() - index;
                tracing::info!(remaining = pending.len() - index, "sync cycle cancelled");
                break;
            }

            let id = &record.record_id;

            if let Some(entry) = self.queue.entry(id)
                && entry.next_eligible_at > now
            {
                report.deferred += 1;
                report
                    .outcomes
                    .push((id.clone(), RecordOutcome::DeferredBackoff));
                continue;
            }

            if !self.lineage_outcome_known(record)? {
                report.deferred += 1;
                report
                    .outcomes
                    .push((id.clone(), RecordOutcome::DeferredLineage));
                continue;
            }

            // Use the claimed state, not the cycle-start snapshot: a
            // foreground edit may have landed in between.
            let claimed = match self.store.begin_syncing(id) {
                Ok(record) => record,
                // The record moved under us (e.g. resolved elsewhere);
                // not this cycle's problem.
                Err(StoreError::InvalidTransition { .. }) | Err(StoreError::NotFound { .. }) => {
                    report.deferred += 1;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let envelope = match SyncEnvelope::for_record(&claimed) {
                Ok(envelope) => envelope,
                Err(err) => {
                    self.store.revert_syncing(id)?;
                    return Err(err);
                }
            };

            match transport.send(&envelope, self.send_timeout) {
                Ok(SendOutcome::Ack { server_version })
                | Ok(SendOutcome::AlreadyApplied { server_version }) => {
                    self.store.mark_synced(id, server_version)?;
                    self.queue.remove(id);
                    report.synced += 1;
                    report
                        .outcomes
                        .push((id.clone(), RecordOutcome::Synced { server_version }));
                    self.publish(SyncEvent::RecordSynced {
                        record_id: id.clone(),
                        server_version,
                    });
                    tracing::debug!(record_id = %id, server_version, "record synced");
                }
                Ok(SendOutcome::Conflict {
                    server_version,
                    server_snapshot,
                }) => {
                    self.store.mark_conflict(id, server_version, server_snapshot)?;
                    self.queue.remove(id);
                    report.conflicts += 1;
                    report
                        .outcomes
                        .push((id.clone(), RecordOutcome::Conflicted { server_version }));
                    self.publish(SyncEvent::RecordConflicted {
                        record_id: id.clone(),
                        server_version,
                    });
                    tracing::warn!(record_id = %id, server_version, "record conflicted");
                }
                Err(err) => {
                    self.store.revert_syncing(id)?;
                    let delay = self.policy.delay_for_attempt(
                        self.queue.entry(id).map(|e| e.attempt).unwrap_or(0),
                    );
                    let Some((attempt, next_eligible_at)) =
                        self.queue.entry_mut(id).map(|entry| {
                            entry.attempt += 1;
                            // Jitter may collapse the delay to zero;
                            // eligibility is still strictly later than
                            // this cycle.
                            entry.next_eligible_at =
                                now.saturating_add_ms((delay.as_millis() as u64).max(1));
                            entry.last_error = Some(err.to_string());
                            (entry.attempt, entry.next_eligible_at)
                        })
                    else {
                        continue;
                    };
                    report.retried += 1;
                    report
                        .outcomes
                        .push((id.clone(), RecordOutcome::Retried { attempt }));
                    self.publish(SyncEvent::RecordRetried {
                        record_id: id.clone(),
                        attempt,
                        next_eligible_at,
                    });
                    tracing::warn!(
                        record_id = %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient send failure: {err}"
                    );
                }
            }
        }

        let stalled = !self.queue.is_empty() && self.queue.any_exhausted(self.max_attempts);
        self.store.set_sync_stalled(stalled);
        if stalled {
            tracing::warn!(max_attempts = self.max_attempts, "sync queue stalled");
        }

        self.publish(SyncEvent::CycleFinished {
            synced: report.synced,
            conflicts: report.conflicts,
            retried: report.retried,
            deferred: report.deferred,
            cancelled: report.cancelled,
        });
        Ok(report)
    }

    /// A record superseding another is never sent before its
    /// predecessor's outcome (sync or confirmed conflict) is known - the
    /// server must not observe an edit before the state it edited.
    fn lineage_outcome_known(&self, record: &crate::core::FieldRecord) -> SyncResult<bool> {
        let Some(predecessor_id) = &record.supersedes else {
            return Ok(true);
        };
        match self.store.get(predecessor_id) {
            Ok(predecessor) => Ok(matches!(
                predecessor.lifecycle,
                LifecycleState::Synced | LifecycleState::Conflict
            )),
            // A vanished predecessor cannot gate forever.
            Err(StoreError::NotFound { .. }) => Ok(true),
            Err(err) => Err(err.into()),
        }
    }

    fn publish(&mut self, event: SyncEvent) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
