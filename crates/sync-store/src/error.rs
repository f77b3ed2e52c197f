//! # Storage Error Types
//!
//! Error types for outbox persistence operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StorageError (this module) ← Adds context and categorization          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError (sync-engine) ← Wraps via #[from]                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller sees a typed, loggable error                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Outbox persistence errors.
///
/// These wrap sqlx errors and add context for debugging. Every mutating
/// operation is durable before it returns success, and every read sees the
/// effect of prior successful writes from the same process — properties
/// the backing SQLite pool provides by default (WAL mode, single-writer
/// ordering).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Entry not found in the outbox.
    #[error("outbox entry not found: {id}")]
    NotFound { id: String },

    /// Database connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// The store has already been closed.
    #[error("outbox store is closed")]
    Closed,

    /// A row carried a status string the store doesn't recognise.
    #[error("corrupt status for entry {id}: {raw}")]
    CorruptStatus { id: String, raw: String },

    /// Internal storage error.
    #[error("internal storage error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Creates a `NotFound` error for a given id.
    pub fn not_found(id: impl Into<String>) -> Self {
        StorageError::NotFound { id: id.into() }
    }
}

/// Convert sqlx errors to `StorageError`.
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound { id: "unknown".to_string() },
            sqlx::Error::PoolTimedOut => StorageError::PoolExhausted,
            sqlx::Error::PoolClosed => StorageError::ConnectionFailed("pool is closed".to_string()),
            sqlx::Error::Database(db_err) => StorageError::QueryFailed(db_err.message().to_string()),
            other => StorageError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
