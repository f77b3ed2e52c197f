//! # sync-engine: Offline-First Bidirectional Sync Engine
//!
//! Coordinates a durable outbox, a pluggable transport adapter, a
//! configurable conflict resolver, and a network observer into a single
//! background-drainable sync engine.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SyncCoordinator (Main Orchestrator)                │
//! │                                                                         │
//! │  Enqueue(id, kind, payload) ──► outbox (sync-store) ──► debounced drain │
//! │  notify_foreground() and a network-up transition each schedule their    │
//! │  own debounced drain the same way; a periodic ticker drains on a fixed  │
//! │  interval regardless.                                                  │
//! │                                                                         │
//! │         ┌─────────────────────┬─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                  │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  DrainCycle    │  │ NetworkObserver│  │   ConflictResolver     │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Single-flight, │  │ online/offline │  │ 8 strategies, chosen   │    │
//! │  │ bounded         │  │ with forced    │  │ once per coordinator   │    │
//! │  │ concurrency,    │  │ override for   │  │                        │    │
//! │  │ retry routing   │  │ testing        │  │                        │    │
//! │  └────────┬───────┘  └────────────────┘  └────────────────────────┘    │
//! │           ▼                                                             │
//! │  ┌────────────────┐                                                    │
//! │  │  dyn Adapter   │  caller-supplied transport to the remote service   │
//! │  └────────────────┘                                                    │
//! │                                                                         │
//! │  EVENTS (broadcast): SyncStarted/Completed/Failed, ItemQueued/Synced/   │
//! │  Failed, ConnectionChanged, QueueChanged                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`coordinator`] - `SyncCoordinator`, its builder, and `SyncStatus`
//! - [`drain`] - The single-flight drain cycle that empties the outbox
//! - [`adapter`] - `Adapter` trait, outcome types, and `MockAdapter`
//! - [`resolver`] - `ConflictResolver` and its eight built-in strategies
//! - [`retry`] - `RetryPolicy`, the stateless backoff calculator
//! - [`network`] - `NetworkObserver`, connectivity tracking with override
//! - [`events`] - `Event` stream and optional synchronous `Hooks`
//! - [`config`] - `EngineConfig`, TOML-backed with validation
//! - [`error`] - `SyncError` and `SyncResult`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sync_engine::{SyncCoordinatorBuilder, EngineConfig};
//! use sync_store::SqliteOutboxStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteOutboxStore::connect(store_config).await?);
//! let adapter = Arc::new(MyAdapter::new());
//! let coordinator = SyncCoordinatorBuilder::new(store, adapter)
//!     .with_config(EngineConfig::load_or_default(None))
//!     .build()?;
//!
//! coordinator.initialize().await?;
//! coordinator.start().await?;
//! coordinator.enqueue("order-1", "orders", payload).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod adapter;
pub mod config;
pub mod coordinator;
pub mod drain;
pub mod error;
pub mod events;
pub mod network;
pub mod resolver;
pub mod retry;

#[cfg(test)]
mod integration_tests;

// =============================================================================
// Re-exports
// =============================================================================

pub use adapter::{Adapter, AdapterOutcome, FetchUpdatesQuery, FetchUpdatesResult, MockAdapter, MutationKind};
pub use config::{ConflictStrategyName, EngineConfig};
pub use coordinator::{SyncCoordinator, SyncCoordinatorBuilder, SyncStatus};
pub use drain::DrainCycle;
pub use error::{SyncError, SyncResult};
pub use events::{Event, Hooks};
pub use network::{ConnectivityChange, ListenerId, NetworkObserver, SharedNetworkObserver};
pub use resolver::{ConflictResolver, ConflictStrategy, CustomResolverFn, Resolution, ResolutionInput};
pub use retry::RetryPolicy;
