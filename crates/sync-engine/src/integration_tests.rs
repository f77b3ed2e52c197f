//! End-to-end scenarios exercising the coordinator, the drain cycle, and a
//! real (in-memory) SQLite-backed outbox together, rather than one module
//! in isolation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sync_core::{EntryStatus, OutboxEntry};
use sync_store::{OutboxStore, SqliteOutboxStore, StoreConfig};

use crate::adapter::{AdapterOutcome, MockAdapter};
use crate::coordinator::SyncCoordinatorBuilder;
use crate::network::NetworkObserver;
use crate::resolver::ConflictStrategy;
use crate::{EngineConfig, SyncError};

async fn sqlite_store() -> Arc<dyn OutboxStore> {
    Arc::new(SqliteOutboxStore::connect(StoreConfig::in_memory()).await.unwrap())
}

#[tokio::test]
async fn offline_enqueue_then_online_drain_marks_everything_synced() {
    let store = sqlite_store().await;
    let network = Arc::new(NetworkObserver::manual(false));
    let mut config = EngineConfig::default();
    config.sync_interval_ms = 60_000;

    let coordinator = SyncCoordinatorBuilder::new(store, Arc::new(MockAdapter::always_ok()))
        .with_config(config)
        .with_network(network.clone())
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();
    coordinator.start().await.unwrap();

    coordinator.enqueue("order-1", "orders", json!({"total": 10})).await.unwrap();
    coordinator.enqueue("order-2", "orders", json!({"total": 20})).await.unwrap();

    // Offline: nothing should drain even after the debounce window passes.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = coordinator.status().await.unwrap();
    assert_eq!(status.queue.pending, 2);
    assert_eq!(status.queue.synced, 0);

    network.set_forced(Some(true)).await;
    // The network-up trigger is debounced (~1s) before it drains.
    tokio::time::sleep(Duration::from_millis(1_200)).await;

    let status = coordinator.status().await.unwrap();
    assert_eq!(status.queue.synced, 2);
    assert_eq!(status.queue.pending, 0);

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn reconnect_drain_is_debounced_and_coalesces_rapid_flapping() {
    let store = sqlite_store().await;
    let network = Arc::new(NetworkObserver::manual(false));
    let adapter = Arc::new(MockAdapter::always_ok());
    let mut config = EngineConfig::default();
    config.sync_interval_ms = 60_000;

    let coordinator = SyncCoordinatorBuilder::new(store, adapter.clone())
        .with_config(config)
        .with_network(network.clone())
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();
    coordinator.start().await.unwrap();
    coordinator.enqueue("a", "todo", json!({})).await.unwrap();

    // Rapidly flap the connection a few times; each transition to online
    // should reset the debounce window rather than stacking up drains.
    for _ in 0..3 {
        network.set_forced(Some(true)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        network.set_forced(Some(false)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    network.set_forced(Some(true)).await;

    // Immediately after the last flap the debounce window hasn't elapsed.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(adapter.call_count(), 0, "debounce must coalesce flapping, not fire on every transition");

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    let status = coordinator.status().await.unwrap();
    assert_eq!(status.queue.synced, 1);

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn notify_foreground_triggers_a_debounced_drain_when_online() {
    let store = sqlite_store().await;
    let mut config = EngineConfig::default();
    config.sync_interval_ms = 60_000;

    let coordinator = SyncCoordinatorBuilder::new(store.clone(), Arc::new(MockAdapter::always_ok()))
        .with_config(config)
        .with_network(Arc::new(NetworkObserver::manual(true)))
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();
    coordinator.start().await.unwrap();

    // Let the empty startup drain settle, then insert an entry directly so
    // this test isolates the foreground trigger from the enqueue debounce.
    tokio::time::sleep(Duration::from_millis(50)).await;
    store.put(OutboxEntry::new("a", "todo", json!({}))).await.unwrap();

    coordinator.notify_foreground();

    // Before the foreground debounce elapses, nothing has synced yet.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = coordinator.status().await.unwrap();
    assert_eq!(status.queue.synced, 0, "foreground trigger must wait out its debounce window");

    tokio::time::sleep(Duration::from_millis(500)).await;
    let status = coordinator.status().await.unwrap();
    assert_eq!(status.queue.synced, 1);

    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn notify_foreground_is_a_no_op_before_start() {
    let store = sqlite_store().await;
    let adapter = Arc::new(MockAdapter::always_ok());
    let coordinator = SyncCoordinatorBuilder::new(store, adapter.clone())
        .with_network(Arc::new(NetworkObserver::manual(true)))
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();
    coordinator.enqueue("a", "todo", json!({})).await.unwrap();

    coordinator.notify_foreground();
    tokio::time::sleep(Duration::from_millis(700)).await;

    assert_eq!(adapter.call_count(), 0, "a foreground notification before start must not drain");
}

#[tokio::test]
async fn retry_exhaustion_moves_entry_to_failed_after_max_attempts() {
    let store = sqlite_store().await;
    let always_retryable = MockAdapter::always(AdapterOutcome::RetryableError { code: "503".into(), message: "down".into() });
    let mut config = EngineConfig::default();
    config.max_attempts = 3;
    config.initial_retry_delay_ms = 1;
    config.max_retry_delay_ms = 1;
    config.sync_interval_ms = 60_000;

    let coordinator = SyncCoordinatorBuilder::new(store, Arc::new(always_retryable))
        .with_config(config)
        .with_network(Arc::new(NetworkObserver::manual(true)))
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();

    coordinator.enqueue("a", "todo", json!({})).await.unwrap();

    for _ in 0..3 {
        coordinator.force_sync().await.unwrap();
    }

    let status = coordinator.status().await.unwrap();
    assert_eq!(status.queue.failed, 1);
    assert_eq!(status.queue.pending, 0);
}

#[tokio::test]
async fn timestamp_wins_conflict_keeps_the_newer_side() {
    let store = sqlite_store().await;
    let server_payload = json!({"updated_at": "2024-01-01T00:00:00Z", "text": "server"});
    let adapter = MockAdapter::always(AdapterOutcome::Conflict { server_state: server_payload });
    let mut config = EngineConfig::default();
    config.sync_interval_ms = 60_000;

    let coordinator = SyncCoordinatorBuilder::new(store, Arc::new(adapter))
        .with_config(config)
        .with_network(Arc::new(NetworkObserver::manual(true)))
        .with_conflict_strategy(ConflictStrategy::TimestampWins)
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();

    coordinator
        .enqueue("a", "todo", json!({"updated_at": "2023-01-01T00:00:00Z", "text": "local"}))
        .await
        .unwrap();
    coordinator.force_sync().await.unwrap();

    // local is older than server, so the local mutation is dropped.
    let status = coordinator.status().await.unwrap();
    assert_eq!(status.queue.total(), 0);
}

#[tokio::test]
async fn client_wins_conflict_reenqueues_local_with_reset_attempts() {
    let store = sqlite_store().await;
    let adapter = MockAdapter::always(AdapterOutcome::Conflict { server_state: json!({"text": "server"}) });
    let mut config = EngineConfig::default();
    config.sync_interval_ms = 60_000;

    let coordinator = SyncCoordinatorBuilder::new(store.clone(), Arc::new(adapter))
        .with_config(config)
        .with_network(Arc::new(NetworkObserver::manual(true)))
        .with_conflict_strategy(ConflictStrategy::ClientWins)
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();

    coordinator.enqueue("a", "todo", json!({"text": "local"})).await.unwrap();
    coordinator.force_sync().await.unwrap();

    let reenqueued = store.get("a").await.unwrap().expect("entry should still exist");
    assert_eq!(reenqueued.status, EntryStatus::Pending);
    assert_eq!(reenqueued.attempts, 0);
    assert_eq!(reenqueued.payload["text"], "local");
}

#[tokio::test]
async fn crash_recovery_promotes_syncing_rows_back_to_pending() {
    let store = sqlite_store().await;

    let mut stuck = OutboxEntry::new("a", "todo", json!({}));
    stuck.attempts = 1;
    store.put(stuck).await.unwrap();
    store.set_status("a", EntryStatus::Syncing, false).await.unwrap();

    // Simulates the process restarting: a fresh coordinator over the same
    // store sees the row still marked `syncing` and recovers it on init.
    let coordinator = SyncCoordinatorBuilder::new(store.clone(), Arc::new(MockAdapter::always_ok()))
        .with_network(Arc::new(NetworkObserver::manual(true)))
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();

    let recovered = store.get("a").await.unwrap().unwrap();
    assert_eq!(recovered.status, EntryStatus::Pending);
    assert_eq!(recovered.attempts, 1, "crash recovery must not touch attempts");
}

#[tokio::test]
async fn drain_respects_batch_size_and_created_at_ordering() {
    let store = sqlite_store().await;

    for (i, id) in ["c", "a", "b"].into_iter().enumerate() {
        let mut entry = OutboxEntry::new(id, "todo", json!({"seq": i}));
        entry.created_at = chrono::DateTime::from_timestamp_millis(1_000 + i as i64).unwrap();
        entry.updated_at = entry.created_at;
        store.put(entry).await.unwrap();
    }

    let batch = store.next_batch(2).await.unwrap();
    assert_eq!(batch.len(), 2, "next_batch must respect the requested limit");
    let ids: Vec<&str> = batch.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "a"], "batch must be ordered by created_at, id ascending");
}

#[tokio::test]
async fn force_sync_errors_without_draining_when_offline() {
    let store = sqlite_store().await;
    let coordinator = SyncCoordinatorBuilder::new(store, Arc::new(MockAdapter::always_ok()))
        .with_network(Arc::new(NetworkObserver::manual(false)))
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();
    coordinator.enqueue("a", "todo", json!({})).await.unwrap();

    let result = coordinator.force_sync().await;
    assert!(matches!(result, Err(SyncError::NotOnline)));

    let status = coordinator.status().await.unwrap();
    assert_eq!(status.queue.pending, 1);
}

#[tokio::test]
async fn unsynced_entries_survive_a_fresh_initialize_over_the_same_store() {
    let store = sqlite_store().await;
    {
        let coordinator = SyncCoordinatorBuilder::new(store.clone(), Arc::new(MockAdapter::always_ok()))
            .with_network(Arc::new(NetworkObserver::manual(false)))
            .build()
            .unwrap();
        coordinator.initialize().await.unwrap();
        coordinator.enqueue("a", "todo", json!({})).await.unwrap();
        coordinator.shutdown().await.unwrap();
    }

    // A brand new coordinator over the same backing store, as after a
    // process restart: the unsynced entry must still be there and still
    // eligible for a future drain.
    let coordinator = SyncCoordinatorBuilder::new(store.clone(), Arc::new(MockAdapter::always_ok()))
        .with_network(Arc::new(NetworkObserver::manual(false)))
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();

    let status = coordinator.status().await.unwrap();
    assert_eq!(status.queue.pending, 1);
    assert_eq!(status.queue.synced, 0);
}

#[tokio::test]
async fn attempts_never_decreases_across_successive_retryable_failures() {
    let store = sqlite_store().await;
    let always_retryable =
        MockAdapter::always(AdapterOutcome::RetryableError { code: "503".into(), message: "down".into() });
    let mut config = EngineConfig::default();
    config.max_attempts = 5;
    config.initial_retry_delay_ms = 1;
    config.max_retry_delay_ms = 1;
    config.sync_interval_ms = 60_000;

    let coordinator = SyncCoordinatorBuilder::new(store.clone(), Arc::new(always_retryable))
        .with_config(config)
        .with_network(Arc::new(NetworkObserver::manual(true)))
        .build()
        .unwrap();
    coordinator.initialize().await.unwrap();
    coordinator.enqueue("a", "todo", json!({})).await.unwrap();

    let mut last_attempts = 0i64;
    for _ in 0..4 {
        coordinator.force_sync().await.unwrap();
        let entry = store.get("a").await.unwrap().unwrap();
        assert!(entry.attempts >= last_attempts, "attempts must never decrease between reads");
        last_attempts = entry.attempts;
    }
    assert_eq!(last_attempts, 4);
}

#[tokio::test]
async fn repeated_initialize_calls_are_idempotent() {
    let store = sqlite_store().await;
    let mut stuck = OutboxEntry::new("a", "todo", json!({}));
    stuck.attempts = 2;
    store.put(stuck).await.unwrap();
    store.set_status("a", EntryStatus::Syncing, false).await.unwrap();

    let coordinator = SyncCoordinatorBuilder::new(store.clone(), Arc::new(MockAdapter::always_ok()))
        .with_network(Arc::new(NetworkObserver::manual(true)))
        .build()
        .unwrap();

    coordinator.initialize().await.unwrap();
    let after_first = store.get("a").await.unwrap().unwrap();
    coordinator.initialize().await.unwrap();
    coordinator.initialize().await.unwrap();
    let after_third = store.get("a").await.unwrap().unwrap();

    assert_eq!(after_first.status, after_third.status);
    assert_eq!(after_first.attempts, after_third.attempts);
    assert_eq!(after_third.status, EntryStatus::Pending);
    assert_eq!(after_third.attempts, 2);
}
