//! # sync-core: Pure Domain Types for the Sync Engine
//!
//! This crate is the **heart** of the sync engine's data model. It contains
//! the outbox entry type, status vocabulary, and payload accessors as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sync Engine Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Caller application                           │   │
//! │  │   Enqueue(id, kind, payload) ──► Status() ──► Subscribe(events) │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                      sync-engine                                 │   │
//! │  │     SyncCoordinator, RetryScheduler, ConflictResolver,           │   │
//! │  │     NetworkObserver, Adapter                                     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ sync-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐                                 │   │
//! │  │   │   types   │  │   error   │                                 │   │
//! │  │   │OutboxEntry│  │CoreError  │                                 │   │
//! │  │   │EntryStatus│  │Validation │                                 │   │
//! │  │   └───────────┘  └───────────┘                                 │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    sync-store (Persistence Layer)                │   │
//! │  │              SQLite queries, migrations, repository              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (`OutboxEntry`, `EntryStatus`, payload accessors)
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Opaque Payloads**: Payloads are self-describing JSON, never pattern-matched
//!    on a language-specific map type outside the accessor functions in this crate
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use sync_core::{EntryStatus, OutboxEntry};
//! use serde_json::json;
//!
//! let entry = OutboxEntry::new("order-1", "orders", json!({"total": 42}));
//! assert_eq!(entry.status, EntryStatus::Pending);
//! assert_eq!(entry.attempts, 0);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use sync_core::OutboxEntry` instead of
// `use sync_core::types::OutboxEntry`

pub use error::{CoreError, ValidationError};
pub use types::*;
