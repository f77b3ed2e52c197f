//! # Sync Error Types
//!
//! Error types for the coordinator and its collaborators.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Adapter      │  │      Lifecycle          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Config         │  │  Retryable      │  │  NotOnline              │ │
//! │  │                 │  │  Permanent      │  │  ShuttingDown           │ │
//! │  │                 │  │  Timeout        │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐ │
//! │  │    Storage      │  │              Internal                      │ │
//! │  │                 │  │                                             │ │
//! │  │  #[from]        │  │  ChannelError                               │ │
//! │  │  StorageError   │  │  Internal                                   │ │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for coordinator operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error taxonomy for the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Rejected at `Initialize` — invalid configuration.
    #[error("invalid sync configuration: {0}")]
    Config(String),

    /// Outbox persistence failed.
    #[error(transparent)]
    Storage(#[from] sync_store::StorageError),

    /// `ForceSync` was called while the network observer reports offline.
    #[error("cannot force sync while offline")]
    NotOnline,

    /// Adapter reported a retryable failure (transient network/server issue).
    #[error("retryable adapter error ({code}): {message}")]
    AdapterRetryable { code: String, message: String },

    /// Adapter reported a permanent failure (the mutation itself is invalid).
    #[error("permanent adapter error ({code}): {message}")]
    AdapterPermanent { code: String, message: String },

    /// An Adapter call exceeded `requestTimeout`. Treated as retryable.
    #[error("adapter call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The coordinator is shutting down or has shut down; no new drains.
    #[error("sync coordinator is shutting down")]
    ShuttingDown,

    /// An internal channel was closed unexpectedly.
    #[error("internal channel error: {0}")]
    ChannelError(String),

    /// Any other internal/unexpected condition.
    #[error("internal sync error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether the drain loop should treat this as a retryable failure for
    /// the entry that produced it ("any Adapter call raising
    /// an unexpected error outside the retryable/non-retryable taxonomy"
    /// is treated as retryable).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::AdapterRetryable { .. } | SyncError::Timeout(_) | SyncError::ChannelError(_) | SyncError::Internal(_)
        )
    }

    /// Whether this indicates a configuration problem rejected at
    /// `Initialize` rather than a per-entry failure.
    pub fn is_config_error(&self) -> bool {
        matches!(self, SyncError::Config(_))
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_retryable_and_timeout_are_retryable() {
        assert!(SyncError::AdapterRetryable { code: "503".into(), message: "busy".into() }.is_retryable());
        assert!(SyncError::Timeout(std::time::Duration::from_secs(10)).is_retryable());
        assert!(!SyncError::AdapterPermanent { code: "400".into(), message: "bad".into() }.is_retryable());
        assert!(!SyncError::NotOnline.is_retryable());
    }

    #[test]
    fn config_errors_are_flagged() {
        assert!(SyncError::Config("bad url".into()).is_config_error());
        assert!(!SyncError::NotOnline.is_config_error());
    }
}
