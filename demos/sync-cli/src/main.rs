//! # sync-cli
//!
//! Runnable demo that wires sync-store and sync-engine together against an
//! in-memory adapter, so the coordinator's lifecycle and event stream can
//! be observed without a real backend.
//!
//! Not a product surface: no argument parsing, no interactive shell. It
//! enqueues a handful of mutations, forces an offline window, brings the
//! network back, and prints every event and status transition along the
//! way.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sync_engine::{
    AdapterOutcome, EngineConfig, Event, MockAdapter, NetworkObserver, SyncCoordinatorBuilder,
};
use sync_store::{OutboxStore, SqliteOutboxStore, StoreConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    FmtSubscriber::builder().with_max_level(Level::INFO).with_target(true).pretty().init();

    info!("starting sync-cli demo");

    let store: Arc<dyn OutboxStore> = Arc::new(SqliteOutboxStore::connect(StoreConfig::in_memory()).await?);

    let adapter = Arc::new(MockAdapter::scripted(vec![
        AdapterOutcome::RetryableError { code: "503".into(), message: "backend warming up".into() },
        AdapterOutcome::Ok(None),
        AdapterOutcome::Ok(None),
    ]));

    let network = Arc::new(NetworkObserver::manual(false));

    let mut config = EngineConfig::new();
    config.batch_size = 5;
    config.sync_interval_ms = 500;
    config.max_attempts = 4;
    config.initial_retry_delay_ms = 50;
    config.max_retry_delay_ms = 200;

    let coordinator = SyncCoordinatorBuilder::new(store, adapter)
        .with_config(config)
        .with_network(network.clone())
        .build()?;

    coordinator.initialize().await?;

    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log_event(&event);
        }
    });

    coordinator.start().await?;

    info!("enqueueing three mutations while offline");
    coordinator.enqueue("order-1", "orders", json!({"_op": "create", "total": 42})).await?;
    coordinator.enqueue("order-2", "orders", json!({"_op": "create", "total": 17})).await?;
    coordinator.enqueue("order-3", "orders", json!({"_op": "update", "total": 99})).await?;

    let status = coordinator.status().await?;
    info!(?status.queue, is_online = status.is_online, "status while offline");

    info!("bringing network back online");
    network.set_forced(Some(true)).await;

    // The reconnect trigger is debounced (~1s); the periodic ticker
    // (500ms) would also eventually pick this up, but we wait out the
    // debounce window explicitly to show it in the logs.
    tokio::time::sleep(Duration::from_millis(1_200)).await;

    let status = coordinator.status().await?;
    info!(?status.queue, is_online = status.is_online, "status after reconnect drain");

    info!("simulating the host application coming to the foreground");
    coordinator.enqueue("order-4", "orders", json!({"_op": "create", "total": 8})).await?;
    coordinator.notify_foreground();
    tokio::time::sleep(Duration::from_millis(600)).await;

    let status = coordinator.status().await?;
    info!(?status.queue, is_online = status.is_online, "status after foreground drain");

    coordinator.shutdown().await?;
    info!("sync-cli demo finished");

    Ok(())
}

fn log_event(event: &Event) {
    match event {
        Event::SyncStarted => info!("event: sync started"),
        Event::SyncCompleted { synced, errors } => info!(synced, errors, "event: sync completed"),
        Event::SyncFailed { error } => info!(%error, "event: sync failed"),
        Event::ItemQueued { id, kind } => info!(%id, %kind, "event: item queued"),
        Event::ItemSynced { entry } => info!(id = %entry.id, "event: item synced"),
        Event::ItemFailed { entry, error } => info!(id = %entry.id, %error, "event: item failed"),
        Event::ConnectionChanged { online } => info!(online, "event: connection changed"),
        Event::QueueChanged { status } => info!(?status, "event: queue changed"),
    }
}
