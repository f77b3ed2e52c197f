//! # Sync Coordinator
//!
//! The public entry point for the sync engine. Owns the outbox store, the
//! network observer, and a [`DrainCycle`]; exposes the lifecycle and
//! queueing operations applications call directly.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SyncCoordinator Lifecycle                         │
//! │                                                                         │
//! │  Initialize() ──► Start() ──┬──► periodic ticker: every sync_interval   │
//! │                              │      → DrainCycle::run() if online       │
//! │                              ├──► immediate opportunistic drain if      │
//! │                              │      already online at start            │
//! │                              ├──► network listener: online transition   │
//! │                              │      → debounced (~1s) DrainCycle::run() │
//! │                              ├──► notify_foreground() debounce (~500ms) │
//! │                              └──► Enqueue() debounce (~100ms) trigger   │
//! │                                                                         │
//! │  Every trigger is gated on the coordinator being active (started) and  │
//! │  the network observer reporting online.                                │
//! │                                                                         │
//! │  Stop() ──► background tasks cancelled, coordinator stays usable        │
//! │  Shutdown() ──► Stop() + store.close()                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, info, warn};

use sync_core::{EntryStatus, OutboxEntry};
use sync_store::{OutboxStats, OutboxStore};

use crate::adapter::Adapter;
use crate::config::{ConflictStrategyName, EngineConfig};
use crate::drain::DrainCycle;
use crate::error::{SyncError, SyncResult};
use crate::events::{Event, Hooks};
use crate::network::NetworkObserver;
use crate::resolver::{ConflictResolver, ConflictStrategy};
use crate::retry::RetryPolicy;

/// Debounce window for a drain triggered by a network online transition.
const NETWORK_UP_DEBOUNCE: Duration = Duration::from_secs(1);

/// Debounce window for a drain triggered by [`SyncCoordinator::notify_foreground`].
const FOREGROUND_DEBOUNCE: Duration = Duration::from_millis(500);

/// Translates a configuration-file strategy name into a resolver strategy.
/// `Custom` cannot be represented this way — `EngineConfig::validate`
/// rejects it before a coordinator is ever built from config.
fn conflict_strategy_from_name(name: &ConflictStrategyName) -> ConflictStrategy {
    match name {
        ConflictStrategyName::ClientWins => ConflictStrategy::ClientWins,
        ConflictStrategyName::ServerWins => ConflictStrategy::ServerWins,
        ConflictStrategyName::TimestampWins => ConflictStrategy::TimestampWins,
        ConflictStrategyName::VersionBased { field } => ConflictStrategy::VersionBased { field: field.clone() },
        ConflictStrategyName::Merge => ConflictStrategy::Merge,
        ConflictStrategyName::SmartMerge { keys } => ConflictStrategy::SmartMerge { keys: keys.clone() },
        ConflictStrategyName::Manual => ConflictStrategy::Manual,
        ConflictStrategyName::Custom => ConflictStrategy::Manual,
    }
}

/// Coalescing debounce shared by every drain trigger (enqueue, network-up,
/// foreground). Bumps `debounce_generation`, sleeps `delay`, then runs a
/// drain only if still active, online, and no newer trigger has superseded
/// this one in the meantime.
fn spawn_debounced_drain(
    debounce_generation: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    drain: DrainCycle,
    network: Arc<NetworkObserver>,
    delay: Duration,
) {
    let generation = debounce_generation.fetch_add(1, Ordering::SeqCst) + 1;

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if !running.load(Ordering::SeqCst) {
            return;
        }
        if debounce_generation.load(Ordering::SeqCst) != generation {
            return;
        }
        if network.is_online().await {
            if let Err(e) = drain.run().await {
                warn!(?e, "debounced drain cycle failed");
            }
        }
    });
}

// =============================================================================
// Status
// =============================================================================

/// Current coordinator status for external queries.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub is_running: bool,
    pub is_online: bool,
    pub is_draining: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub queue: OutboxStats,
}

// =============================================================================
// Builder
// =============================================================================

/// Builds a [`SyncCoordinator`] from its required collaborators.
pub struct SyncCoordinatorBuilder {
    store: Arc<dyn OutboxStore>,
    adapter: Arc<dyn Adapter>,
    network: Option<Arc<NetworkObserver>>,
    config: EngineConfig,
    hooks: Hooks,
    conflict_strategy: Option<ConflictStrategy>,
}

impl SyncCoordinatorBuilder {
    pub fn new(store: Arc<dyn OutboxStore>, adapter: Arc<dyn Adapter>) -> Self {
        SyncCoordinatorBuilder {
            store,
            adapter,
            network: None,
            config: EngineConfig::default(),
            hooks: Hooks::new(),
            conflict_strategy: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_network(mut self, network: Arc<NetworkObserver>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Overrides the conflict strategy derived from `config.conflict_strategy`
    /// — the only way to install a `custom(fn)` strategy.
    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = Some(strategy);
        self
    }

    pub fn build(self) -> SyncResult<SyncCoordinator> {
        self.config.validate()?;

        let strategy =
            self.conflict_strategy.unwrap_or_else(|| conflict_strategy_from_name(&self.config.conflict_strategy));
        let retry_policy = RetryPolicy::from(&self.config);
        let resolver = Arc::new(ConflictResolver::new(strategy));
        let hooks = Arc::new(self.hooks);
        let (events_tx, _rx) = broadcast::channel(256);

        let drain = DrainCycle::new(
            self.store.clone(),
            self.adapter,
            retry_policy,
            resolver,
            hooks,
            events_tx.clone(),
            self.config.batch_size,
            self.config.max_concurrent,
        );

        let network = self.network.unwrap_or_else(|| Arc::new(NetworkObserver::manual(true)));

        Ok(SyncCoordinator {
            store: self.store,
            drain,
            network,
            sync_interval: self.config.sync_interval(),
            events_tx,
            running: Arc::new(AtomicBool::new(false)),
            last_sync_at: Arc::new(RwLock::new(None)),
            last_error: Arc::new(RwLock::new(None)),
            debounce_generation: Arc::new(AtomicU64::new(0)),
            debounce_delay: Duration::from_millis(100),
            shutdown: Arc::new(watch::channel(false)),
        })
    }
}

// =============================================================================
// SyncCoordinator
// =============================================================================

/// The single-flight, debounced, bounded-concurrency orchestrator over an
/// outbox store, a network observer, and an adapter.
pub struct SyncCoordinator {
    store: Arc<dyn OutboxStore>,
    drain: DrainCycle,
    network: Arc<NetworkObserver>,
    sync_interval: Duration,
    events_tx: broadcast::Sender<Event>,
    running: Arc<AtomicBool>,
    last_sync_at: Arc<RwLock<Option<DateTime<Utc>>>>,
    last_error: Arc<RwLock<Option<String>>>,
    debounce_generation: Arc<AtomicU64>,
    debounce_delay: Duration,
    shutdown: Arc<(watch::Sender<bool>, watch::Receiver<bool>)>,
}

impl SyncCoordinator {
    /// Performs one-time setup: crash recovery on the store, an initial
    /// connectivity probe. Safe to call before `start`.
    pub async fn initialize(&self) -> SyncResult<()> {
        self.store.init().await?;
        self.network.init().await;
        info!("sync coordinator initialized");
        Ok(())
    }

    /// Transitions to active: starts the periodic ticker and the
    /// network-change listener, and triggers one opportunistic drain if
    /// already online. A no-op if already running.
    pub async fn start(&self) -> SyncResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("coordinator already running");
            return Ok(());
        }

        let _ = self.shutdown.0.send(false);

        self.spawn_ticker();
        self.spawn_network_listener();
        self.spawn_status_tracker();

        if self.network.is_online().await {
            let drain = self.drain.clone();
            tokio::spawn(async move {
                if let Err(e) = drain.run().await {
                    warn!(?e, "startup drain cycle failed");
                }
            });
        }

        info!("sync coordinator started");
        Ok(())
    }

    fn spawn_ticker(&self) {
        let drain = self.drain.clone();
        let network = self.network.clone();
        let interval_duration = self.sync_interval;
        let mut shutdown_rx = self.shutdown.1.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_duration);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if network.is_online().await {
                            if let Err(e) = drain.run().await {
                                warn!(?e, "periodic drain cycle failed");
                            }
                        } else {
                            debug!("periodic tick skipped: offline");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn spawn_network_listener(&self) {
        let network = self.network.clone();
        let drain = self.drain.clone();
        let hooks = self.drain.hooks().clone();
        let events_tx = self.events_tx.clone();
        let debounce_generation = self.debounce_generation.clone();
        let running = self.running.clone();
        let mut shutdown_rx = self.shutdown.1.clone();

        tokio::spawn(async move {
            let (listener_id, mut change_rx) = network.subscribe().await;
            loop {
                tokio::select! {
                    Some(change) = change_rx.recv() => {
                        hooks.fire_connection_change(change.online);
                        let _ = events_tx.send(Event::ConnectionChanged { online: change.online });
                        if change.online {
                            spawn_debounced_drain(
                                debounce_generation.clone(),
                                running.clone(),
                                drain.clone(),
                                network.clone(),
                                NETWORK_UP_DEBOUNCE,
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            network.unsubscribe(listener_id).await;
                            break;
                        }
                    }
                }
            }
        });
    }

    fn spawn_status_tracker(&self) {
        let mut events_rx = self.events_tx.subscribe();
        let last_sync_at = self.last_sync_at.clone();
        let last_error = self.last_error.clone();
        let mut shutdown_rx = self.shutdown.1.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events_rx.recv() => {
                        match event {
                            Ok(Event::SyncCompleted { .. }) => {
                                *last_sync_at.write().await = Some(Utc::now());
                            }
                            Ok(Event::SyncFailed { error }) => {
                                *last_error.write().await = Some(error);
                            }
                            Ok(Event::ItemFailed { error, .. }) => {
                                *last_error.write().await = Some(error);
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Stops background tasks. The coordinator may be `start`ed again.
    pub async fn stop(&self) -> SyncResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.shutdown.0.send(true);
        info!("sync coordinator stopped");
        Ok(())
    }

    /// Accepts a mutation into the outbox and schedules a debounced drain.
    pub async fn enqueue(&self, id: impl Into<String>, kind: impl Into<String>, payload: Value) -> SyncResult<OutboxEntry> {
        let id = id.into();
        let kind = kind.into();
        let entry = OutboxEntry::new(id.clone(), kind.clone(), payload);
        self.store.put(entry.clone()).await?;
        let _ = self.events_tx.send(Event::ItemQueued { id, kind });
        self.schedule_debounced_drain();
        Ok(entry)
    }

    fn schedule_debounced_drain(&self) {
        spawn_debounced_drain(
            self.debounce_generation.clone(),
            self.running.clone(),
            self.drain.clone(),
            self.network.clone(),
            self.debounce_delay,
        );
    }

    /// Notifies the coordinator that the host application came to the
    /// foreground. Schedules a debounced opportunistic drain if active and
    /// online, coalescing with any other pending trigger the same way
    /// `enqueue` and network-up transitions do. A no-op if not running.
    pub fn notify_foreground(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        spawn_debounced_drain(
            self.debounce_generation.clone(),
            self.running.clone(),
            self.drain.clone(),
            self.network.clone(),
            FOREGROUND_DEBOUNCE,
        );
    }

    /// Runs (or waits for) a drain cycle immediately. Fails if offline.
    pub async fn force_sync(&self) -> SyncResult<()> {
        if !self.network.is_online().await {
            return Err(SyncError::NotOnline);
        }
        while self.drain.is_draining() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.drain.run().await
    }

    /// Current aggregate status.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let queue = self.store.stats().await?;
        Ok(SyncStatus {
            is_running: self.running.load(Ordering::SeqCst),
            is_online: self.network.is_online().await,
            is_draining: self.drain.is_draining(),
            last_sync_at: *self.last_sync_at.read().await,
            last_error: self.last_error.read().await.clone(),
            queue,
        })
    }

    /// Subscribes to the coordinator's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    /// Drops a subscription. Broadcast receivers unsubscribe on drop; this
    /// exists for symmetry with `subscribe`.
    pub fn unsubscribe(&self, receiver: broadcast::Receiver<Event>) {
        drop(receiver);
    }

    /// Resets every `failed` entry back to `pending` with `attempts = 0`.
    /// Returns the number of entries reset.
    pub async fn retry_failed(&self) -> SyncResult<u64> {
        let failed = self.store.list_by_status(EntryStatus::Failed).await?;
        let count = failed.len() as u64;
        for mut entry in failed {
            entry.status = EntryStatus::Pending;
            entry.attempts = 0;
            entry.last_attempt_at = None;
            self.store.put(entry).await?;
        }
        if count > 0 {
            self.schedule_debounced_drain();
        }
        Ok(count)
    }

    /// Removes every `synced` entry from the outbox. Returns the number
    /// removed.
    pub async fn purge_synced(&self) -> SyncResult<u64> {
        Ok(self.store.delete_where(EntryStatus::Synced).await?)
    }

    /// Stops background tasks and releases the store's resources. The
    /// coordinator is not usable afterwards.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.stop().await?;
        self.store.close().await?;
        info!("sync coordinator shut down");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockAdapter;
    use serde_json::json;
    use sync_store::InMemoryOutboxStore;

    fn test_coordinator() -> SyncCoordinator {
        let mut config = EngineConfig::default();
        config.sync_interval_ms = 60_000;
        SyncCoordinatorBuilder::new(Arc::new(InMemoryOutboxStore::new()), Arc::new(MockAdapter::always_ok()))
            .with_config(config)
            .with_network(Arc::new(NetworkObserver::manual(true)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn enqueue_then_debounced_drain_marks_synced() {
        let coordinator = test_coordinator();
        coordinator.initialize().await.unwrap();
        coordinator.start().await.unwrap();

        coordinator.enqueue("a", "todo", json!({"text": "hi"})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        let status = coordinator.status().await.unwrap();
        assert_eq!(status.queue.synced, 1);
        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn force_sync_fails_when_offline() {
        let coordinator = SyncCoordinatorBuilder::new(
            Arc::new(InMemoryOutboxStore::new()),
            Arc::new(MockAdapter::always_ok()),
        )
        .with_network(Arc::new(NetworkObserver::manual(false)))
        .build()
        .unwrap();
        coordinator.initialize().await.unwrap();

        let result = coordinator.force_sync().await;
        assert!(matches!(result, Err(SyncError::NotOnline)));
    }

    #[tokio::test]
    async fn retry_failed_resets_failed_entries_to_pending() {
        let coordinator = test_coordinator();
        coordinator.initialize().await.unwrap();

        let mut entry = OutboxEntry::new("a", "todo", json!({}));
        entry.status = EntryStatus::Failed;
        entry.attempts = 3;
        coordinator.store.put(entry).await.unwrap();

        let reset = coordinator.retry_failed().await.unwrap();
        assert_eq!(reset, 1);

        let status = coordinator.status().await.unwrap();
        assert_eq!(status.queue.pending, 1);
        assert_eq!(status.queue.failed, 0);
    }

    #[tokio::test]
    async fn purge_synced_removes_only_synced_entries() {
        let coordinator = test_coordinator();
        coordinator.initialize().await.unwrap();

        let mut synced = OutboxEntry::new("a", "todo", json!({}));
        synced.status = EntryStatus::Synced;
        coordinator.store.put(synced).await.unwrap();
        coordinator.store.put(OutboxEntry::new("b", "todo", json!({}))).await.unwrap();

        let removed = coordinator.purge_synced().await.unwrap();
        assert_eq!(removed, 1);

        let status = coordinator.status().await.unwrap();
        assert_eq!(status.queue.total(), 1);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let coordinator = test_coordinator();
        coordinator.initialize().await.unwrap();
        coordinator.start().await.unwrap();
        coordinator.start().await.unwrap();
        coordinator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn connection_change_hook_fires_on_network_transition() {
        let seen = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen_clone = seen.clone();
        let hooks = Hooks::new().on_connection_change(move |online| {
            if online {
                seen_clone.store(true, Ordering::SeqCst);
            }
        });

        let network = Arc::new(NetworkObserver::manual(false));
        let mut config = EngineConfig::default();
        config.sync_interval_ms = 60_000;
        let coordinator = SyncCoordinatorBuilder::new(Arc::new(InMemoryOutboxStore::new()), Arc::new(MockAdapter::always_ok()))
            .with_config(config)
            .with_network(network.clone())
            .with_hooks(hooks)
            .build()
            .unwrap();
        coordinator.initialize().await.unwrap();
        coordinator.start().await.unwrap();

        network.set_forced(Some(true)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(seen.load(Ordering::SeqCst));
        coordinator.shutdown().await.unwrap();
    }
}
