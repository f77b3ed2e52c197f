//! # sync-store: Outbox Persistence Layer
//!
//! This crate provides durable storage for the sync engine's outbox queue,
//! using SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Engine Data Flow                           │
//! │                                                                         │
//! │  SyncCoordinator (sync-engine)                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     sync-store (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐                       │   │
//! │  │   │ OutboxStore   │    │  Migrations   │                       │   │
//! │  │   │ trait (pool.rs)    │  (embedded)   │                       │   │
//! │  │   │               │    │               │                       │   │
//! │  │   │ SqliteOutbox  │    │ 001_init.sql  │                       │   │
//! │  │   │ InMemoryOutbox│    │               │                       │   │
//! │  │   └───────────────┘    └───────────────┘                       │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - `OutboxStore` trait, `SqliteOutboxStore`, `InMemoryOutboxStore`
//! - [`migrations`] - embedded database migrations
//! - [`error`] - storage error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sync_store::{OutboxStore, SqliteOutboxStore, StoreConfig};
//!
//! let store = SqliteOutboxStore::connect(StoreConfig::new("./sync.db")).await?;
//! store.init().await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;

pub use error::{StorageError, StorageResult};
pub use pool::{InMemoryOutboxStore, OutboxStats, OutboxStore, SqliteOutboxStore, StoreConfig};
