//! # Drain Cycle
//!
//! The single-flight unit of work that empties the outbox: pull a batch,
//! dispatch each entry to the Adapter with bounded concurrency, and route
//! each outcome back into the outbox's status machine.
//!
//! ## Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Drain Cycle                                     │
//! │                                                                         │
//! │  single-flight guard (AtomicBool) ──► already draining? return          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  emit SyncStarted                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  NextBatch(batchSize) ──► empty? emit SyncCompleted{0,0}, return        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  onBeforeSync()                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  for each entry, bounded by Semaphore(maxConcurrent):                  │
//! │    SetStatus(syncing) ──► Adapter call ──► route outcome:               │
//! │      Ok              ──► synced,  onSyncSuccess, emit ItemSynced        │
//! │      RetryableError  ──► pending (retry) or failed (exhausted)          │
//! │      PermanentError  ──► failed                                        │
//! │      Conflict        ──► ConflictResolver ──► re-enqueue/drop/park      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  emit QueueChanged, SyncCompleted{synced, errors}                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, info, warn};

use sync_core::OutboxEntry;
use sync_store::OutboxStore;

use crate::adapter::{infer_mutation_kind, Adapter, AdapterOutcome, MutationKind};
use crate::error::SyncResult;
use crate::events::{Event, Hooks};
use crate::resolver::{ConflictResolver, Resolution, ResolutionInput};
use crate::retry::RetryPolicy;

/// Drives one full emptying of the outbox's pending backlog.
///
/// Cheaply clonable: every field is an `Arc` (or `Copy`), so a single
/// instance can be shared between the coordinator's periodic ticker and
/// its on-demand `ForceSync` path.
#[derive(Clone)]
pub struct DrainCycle {
    store: Arc<dyn OutboxStore>,
    adapter: Arc<dyn Adapter>,
    retry_policy: RetryPolicy,
    resolver: Arc<ConflictResolver>,
    hooks: Arc<Hooks>,
    events: broadcast::Sender<Event>,
    batch_size: usize,
    max_concurrent: usize,
    draining: Arc<AtomicBool>,
}

impl DrainCycle {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        adapter: Arc<dyn Adapter>,
        retry_policy: RetryPolicy,
        resolver: Arc<ConflictResolver>,
        hooks: Arc<Hooks>,
        events: broadcast::Sender<Event>,
        batch_size: usize,
        max_concurrent: usize,
    ) -> Self {
        DrainCycle {
            store,
            adapter,
            retry_policy,
            resolver,
            hooks,
            events,
            batch_size,
            max_concurrent,
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a cycle is currently in flight.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// The hooks bundle this cycle was built with, shared so collaborators
    /// outside the drain loop (the coordinator's network listener) can fire
    /// hooks tied to events the drain cycle itself never sees.
    pub fn hooks(&self) -> &Arc<Hooks> {
        &self.hooks
    }

    fn emit(&self, event: Event) {
        // No receivers is the common case between subscriptions; not an error.
        let _ = self.events.send(event);
    }

    /// Runs one drain cycle. A no-op (returns `Ok(())` immediately) if a
    /// cycle is already in flight — single-flight by design.
    pub async fn run(&self) -> SyncResult<()> {
        if self.draining.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            debug!("drain cycle already in flight, skipping");
            return Ok(());
        }

        let result = self.run_inner().await;
        self.draining.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self) -> SyncResult<()> {
        self.emit(Event::SyncStarted);
        info!("drain cycle started");

        let batch = self.store.next_batch(self.batch_size).await?;
        if batch.is_empty() {
            debug!("drain cycle found nothing pending");
            self.emit(Event::SyncCompleted { synced: 0, errors: 0 });
            return Ok(());
        }

        self.hooks.fire_before_sync();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(batch.len());
        for entry in batch {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            let cycle = self.clone();
            handles.push(tokio::spawn(async move {
                let outcome = cycle.dispatch_one(entry).await;
                drop(permit);
                outcome
            }));
        }

        let mut synced = 0u64;
        let mut errors = 0u64;
        for handle in handles {
            match handle.await {
                Ok(DispatchResult::Synced) => synced += 1,
                Ok(DispatchResult::Errored) => errors += 1,
                Ok(DispatchResult::Parked) | Ok(DispatchResult::ReEnqueued) | Ok(DispatchResult::Dropped) => {}
                Err(join_err) => {
                    warn!(?join_err, "dispatch task panicked");
                    errors += 1;
                }
            }
        }

        let stats = self.store.stats().await?;
        self.hooks.fire_queue_change(&stats);
        self.emit(Event::QueueChanged { status: stats });

        info!(synced, errors, "drain cycle completed");
        self.emit(Event::SyncCompleted { synced, errors });

        Ok(())
    }

    /// Dispatches a single entry to the Adapter and routes its outcome.
    /// Errors are resolved into outbox state transitions rather than
    /// propagated — one entry's failure never aborts the cycle.
    async fn dispatch_one(&self, entry: OutboxEntry) -> DispatchResult {
        if let Err(e) = self.store.set_status(&entry.id, sync_core::EntryStatus::Syncing, false).await {
            warn!(id = %entry.id, ?e, "failed to mark entry syncing");
            return DispatchResult::Errored;
        }

        let outcome = self.call_adapter(&entry).await;

        match outcome {
            AdapterOutcome::Ok(_server_state) => {
                if let Err(e) = self.store.set_status(&entry.id, sync_core::EntryStatus::Synced, true).await {
                    warn!(id = %entry.id, ?e, "failed to mark entry synced");
                    return DispatchResult::Errored;
                }
                self.hooks.fire_sync_success(&entry);
                self.emit(Event::ItemSynced { entry });
                DispatchResult::Synced
            }
            AdapterOutcome::RetryableError { code, message } => {
                let next_attempt = entry.attempts + 1;
                let should_retry = self.retry_policy.should_retry(next_attempt as u32);
                let next_status =
                    if should_retry { sync_core::EntryStatus::Pending } else { sync_core::EntryStatus::Failed };
                if let Err(e) = self.store.set_status(&entry.id, next_status, true).await {
                    warn!(id = %entry.id, ?e, "failed to update entry after retryable error");
                }
                let full_message = format!("{code}: {message}");
                self.hooks.fire_sync_error(&entry, &full_message);
                self.emit(Event::ItemFailed { entry, error: full_message });
                DispatchResult::Errored
            }
            AdapterOutcome::PermanentError { code, message } => {
                if let Err(e) = self.store.set_status(&entry.id, sync_core::EntryStatus::Failed, true).await {
                    warn!(id = %entry.id, ?e, "failed to mark entry failed");
                }
                let full_message = format!("{code}: {message}");
                self.hooks.fire_sync_error(&entry, &full_message);
                self.emit(Event::ItemFailed { entry, error: full_message });
                DispatchResult::Errored
            }
            AdapterOutcome::Conflict { server_state } => self.resolve_conflict(entry, server_state).await,
        }
    }

    async fn call_adapter(&self, entry: &OutboxEntry) -> AdapterOutcome {
        match infer_mutation_kind(&entry.payload) {
            MutationKind::Create => self.adapter.create(&entry.kind, &entry.payload).await,
            MutationKind::Update => self.adapter.update(&entry.kind, &entry.id, &entry.payload).await,
            MutationKind::Delete => self.adapter.delete(&entry.kind, &entry.id).await,
        }
    }

    async fn resolve_conflict(&self, entry: OutboxEntry, server_state: serde_json::Value) -> DispatchResult {
        let input = ResolutionInput { local: entry.clone(), server_state };
        match self.resolver.resolve(&input) {
            Resolution::ReEnqueue(resolved) => {
                if let Err(e) = self.store.put(resolved).await {
                    warn!(id = %entry.id, ?e, "failed to re-enqueue resolved conflict");
                }
                DispatchResult::ReEnqueued
            }
            Resolution::Drop => {
                if let Err(e) = self.store.delete(&entry.id).await {
                    warn!(id = %entry.id, ?e, "failed to drop entry after conflict resolution");
                }
                DispatchResult::Dropped
            }
            Resolution::Park => {
                if let Err(e) = self.store.set_status(&entry.id, sync_core::EntryStatus::Conflict, false).await {
                    warn!(id = %entry.id, ?e, "failed to park conflicted entry");
                }
                DispatchResult::Parked
            }
        }
    }
}

enum DispatchResult {
    Synced,
    Errored,
    ReEnqueued,
    Dropped,
    Parked,
}

// =============================================================================
// Unit Tests
// =============================================================================
