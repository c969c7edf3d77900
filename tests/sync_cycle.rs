//! Dispatcher behavior: ordering, retry, conflict, cancellation.

mod fixtures;

use serde_json::json;
use tempfile::TempDir;

use fieldsync::config::SyncConfig;
use fieldsync::store::ConflictResolution;
use fieldsync::sync::RecordOutcome;
use fieldsync::{
    CancelToken, FieldRecordDraft, LifecycleState, RecordMutation, SyncDispatcher, WallClock,
};

use fixtures::{ScriptedTransport, Step, draft, draft_at, open_store, queue_record};

fn sync_config() -> SyncConfig {
    SyncConfig {
        backoff_base_ms: 100,
        backoff_max_ms: 5_000,
        max_attempts: 3,
        send_timeout_ms: 1_000,
    }
}

#[test]
fn cycle_transmits_in_capture_order_and_marks_synced() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    let older = queue_record(&store, draft_at(1_000, json!({"seq": 1})));
    let newer = queue_record(&store, draft_at(2_000, json!({"seq": 2})));

    let transport = ScriptedTransport::new([
        Step::Ack { server_version: 10 },
        Step::Ack { server_version: 11 },
    ]);
    let mut dispatcher = SyncDispatcher::new(store.clone(), &sync_config());
    let report = dispatcher
        .run_sync_cycle(&transport, &CancelToken::new())
        .unwrap();

    assert_eq!(report.synced, 2);
    assert_eq!(report.conflicts, 0);
    assert!(!report.cancelled);

    let sent = transport.sent();
    assert_eq!(sent[0].0, older);
    assert_eq!(sent[1].0, newer);

    assert_eq!(store.get(&older).unwrap().server_version, Some(10));
    assert_eq!(store.get(&newer).unwrap().server_version, Some(11));
    assert!(store.list_pending().is_empty());
}

#[test]
fn already_applied_is_treated_as_fresh_success() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let id = queue_record(&store, draft(json!({})));

    // The server applied an earlier attempt whose response was lost.
    let transport = ScriptedTransport::new([Step::AlreadyApplied { server_version: 42 }]);
    let mut dispatcher = SyncDispatcher::new(store.clone(), &sync_config());
    let report = dispatcher
        .run_sync_cycle(&transport, &CancelToken::new())
        .unwrap();

    assert_eq!(report.synced, 1);
    let record = store.get(&id).unwrap();
    assert_eq!(record.lifecycle, LifecycleState::Synced);
    assert_eq!(record.server_version, Some(42));
}

#[test]
fn transient_failure_backs_off_then_retries() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let id = queue_record(&store, draft(json!({})));

    let transport = ScriptedTransport::new([Step::Timeout]);
    let mut dispatcher = SyncDispatcher::new(store.clone(), &sync_config());
    let cancel = CancelToken::new();

    let now = WallClock(1_000_000);
    let report = dispatcher.run_sync_cycle_at(&transport, &cancel, now).unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(store.get(&id).unwrap().lifecycle, LifecycleState::PendingSync);

    // Immediately after, the backoff timer defers the record.
    let report = dispatcher.run_sync_cycle_at(&transport, &cancel, now).unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(report.outcomes[0].1, RecordOutcome::DeferredBackoff);
    assert_eq!(transport.sent().len(), 1);

    // Well past any backoff (base 100ms, max 5s) the retry goes out.
    let later = WallClock(1_000_000 + 60_000);
    let report = dispatcher.run_sync_cycle_at(&transport, &cancel, later).unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(store.get(&id).unwrap().lifecycle, LifecycleState::Synced);
}

#[test]
fn conflicting_edit_yields_conflict_state_never_silently_resolved() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    // Committed offline, then edited locally while the server state also
    // moved on.
    let id = queue_record(&store, draft(json!({"area": "1.2ha"})));
    store
        .update(
            &id,
            RecordMutation {
                payload: Some(json!({"area": "1.3ha"})),
                ..RecordMutation::default()
            },
        )
        .unwrap();

    let transport = ScriptedTransport::new([Step::Conflict { server_version: 7 }]);
    let mut dispatcher = SyncDispatcher::new(store.clone(), &sync_config());
    let report = dispatcher
        .run_sync_cycle(&transport, &CancelToken::new())
        .unwrap();

    assert_eq!(report.conflicts, 1);
    assert_eq!(report.synced, 0);

    // Neither side was silently picked: the local payload is intact and
    // the server snapshot is held for the resolution policy.
    let record = store.get(&id).unwrap();
    assert_eq!(record.lifecycle, LifecycleState::Conflict);
    assert_eq!(record.payload, json!({"area": "1.3ha"}));
    let conflict = record.conflict.expect("conflict info retained");
    assert_eq!(conflict.server_version, 7);

    // A later cycle leaves the conflicted record alone.
    let report = dispatcher
        .run_sync_cycle(&transport, &CancelToken::new())
        .unwrap();
    assert_eq!(report.synced + report.conflicts + report.retried, 0);
}

#[test]
fn merged_resolution_flows_back_through_the_queue() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let id = queue_record(&store, draft(json!({"area": "1.2ha"})));

    let transport = ScriptedTransport::new([
        Step::Conflict { server_version: 7 },
        Step::Ack { server_version: 8 },
    ]);
    let mut dispatcher = SyncDispatcher::new(store.clone(), &sync_config());
    dispatcher
        .run_sync_cycle(&transport, &CancelToken::new())
        .unwrap();

    let successor = store
        .resolve_conflict(
            &id,
            ConflictResolution::RetryMerged {
                merged_payload: json!({"area": "1.2ha", "remeasured": true}),
            },
        )
        .unwrap();
    store.mark_pending_sync(&successor.record_id).unwrap();

    let report = dispatcher
        .run_sync_cycle(&transport, &CancelToken::new())
        .unwrap();
    assert_eq!(report.synced, 1);

    let synced = store.get(&successor.record_id).unwrap();
    assert_eq!(synced.lifecycle, LifecycleState::Synced);
    assert_eq!(synced.supersedes, Some(id));
}

#[test]
fn successor_is_never_sent_before_predecessor_outcome_is_known() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    let predecessor = queue_record(&store, draft_at(1_000, json!({"v": 1})));
    let successor_record = store
        .create(FieldRecordDraft {
            captured_at: Some(WallClock(2_000)),
            payload: json!({"v": 2}),
            supersedes: Some(predecessor.clone()),
            ..FieldRecordDraft::default()
        })
        .unwrap();
    let successor = successor_record.record_id.clone();
    store.mark_pending_sync(&successor).unwrap();

    // Predecessor times out: its outcome is unknown, so the successor
    // must stay home this cycle.
    let transport = ScriptedTransport::new([Step::Timeout]);
    let mut dispatcher = SyncDispatcher::new(store.clone(), &sync_config());
    let cancel = CancelToken::new();

    let now = WallClock(1_000_000);
    let report = dispatcher.run_sync_cycle_at(&transport, &cancel, now).unwrap();
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(transport.sent()[0].0, predecessor);
    assert!(
        report
            .outcomes
            .iter()
            .any(|(id, outcome)| *id == successor && *outcome == RecordOutcome::DeferredLineage)
    );

    // Predecessor syncs; the successor follows in the same cycle.
    let later = WallClock(1_000_000 + 60_000);
    let report = dispatcher.run_sync_cycle_at(&transport, &cancel, later).unwrap();
    assert_eq!(report.synced, 2);
    let sent = transport.sent();
    assert_eq!(sent[1].0, predecessor);
    assert_eq!(sent[2].0, successor);
}

#[test]
fn cancelled_cycle_leaves_no_record_in_syncing() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    for i in 0..3 {
        queue_record(&store, draft_at(1_000 + i, json!({ "i": i })));
    }

    let cancel = CancelToken::new();
    let mut transport = ScriptedTransport::acking();
    transport.cancel_after_send = Some(cancel.clone());

    let mut dispatcher = SyncDispatcher::new(store.clone(), &sync_config());
    let report = dispatcher.run_sync_cycle(&transport, &cancel).unwrap();

    // Connectivity died after the first send: that record's outcome was
    // known and applied, the rest went back to the queue untouched.
    assert!(report.cancelled);
    assert_eq!(report.synced, 1);
    assert_eq!(report.deferred, 2);

    let status = store.status();
    assert_eq!(status.syncing, 0);
    assert_eq!(status.pending_sync, 2);
    assert_eq!(status.synced, 1);
}

#[test]
fn exhausted_attempts_surface_as_stalled_status() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    queue_record(&store, draft(json!({})));

    let config = SyncConfig {
        max_attempts: 2,
        ..sync_config()
    };
    let transport = ScriptedTransport::new([Step::Unavailable, Step::Unavailable, Step::Timeout]);
    let mut dispatcher = SyncDispatcher::new(store.clone(), &config);
    let cancel = CancelToken::new();

    let mut now = WallClock(1_000_000);
    dispatcher.run_sync_cycle_at(&transport, &cancel, now).unwrap();
    assert!(!store.status().sync_stalled);

    now = now.saturating_add_ms(60_000);
    dispatcher.run_sync_cycle_at(&transport, &cancel, now).unwrap();
    assert!(store.status().sync_stalled);

    // Connectivity returns; the queue drains and the flag clears.
    now = now.saturating_add_ms(60_000);
    let report = dispatcher.run_sync_cycle_at(&transport, &cancel, now).unwrap();
    assert_eq!(report.retried, 1);
    now = now.saturating_add_ms(60_000);
    let report = dispatcher.run_sync_cycle_at(&transport, &cancel, now).unwrap();
    assert_eq!(report.synced, 1);
    assert!(!store.status().sync_stalled);
}

#[test]
fn dispatcher_events_reach_subscribers() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let id = queue_record(&store, draft(json!({})));

    let transport = ScriptedTransport::new([Step::Ack { server_version: 5 }]);
    let mut dispatcher = SyncDispatcher::new(store, &sync_config());
    let events = dispatcher.subscribe();

    dispatcher
        .run_sync_cycle(&transport, &CancelToken::new())
        .unwrap();

    let collected: Vec<_> = events.try_iter().collect();
    assert!(collected.iter().any(|e| matches!(
        e,
        fieldsync::sync::SyncEvent::RecordSynced { record_id, server_version: 5 }
            if *record_id == id
    )));
    assert!(collected.iter().any(|e| matches!(
        e,
        fieldsync::sync::SyncEvent::CycleFinished { synced: 1, .. }
    )));
}
