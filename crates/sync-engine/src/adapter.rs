//! # Adapter Contract
//!
//! The pluggable transport to the remote service; the outbox's only way
//! out. Four operations, each returning an [`AdapterOutcome`] rather than
//! a plain `Result` — conflict is a first-class outcome, not an error.
//!
//! ## Outcome Routing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        AdapterOutcome                                   │
//! │                                                                         │
//! │  Ok(server_state?)      ──► SetStatus(synced);   emit item_synced       │
//! │  RetryableError         ──► retry policy decides: pending or failed     │
//! │  PermanentError         ──► SetStatus(failed);   emit item_failed       │
//! │  Conflict(server_state) ──► ConflictResolver                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde_json::Value;

// =============================================================================
// Outcome
// =============================================================================

/// The result of a single Adapter call.
#[derive(Debug, Clone)]
pub enum AdapterOutcome {
    /// Transmission succeeded. The adapter may optionally return the
    /// server's resulting state (unused by the drain loop, available to
    /// higher-level collaborators).
    Ok(Option<Value>),
    /// A transient failure; the entry should be retried per policy.
    RetryableError { code: String, message: String },
    /// A failure the entry cannot recover from by retrying.
    PermanentError { code: String, message: String },
    /// The server's state for this id diverges from the local baseline.
    Conflict { server_state: Value },
}

/// The mutation kind the coordinator infers from payload markers or `kind`
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// A page of entities returned by `FetchUpdates`, for higher-level
/// collaborators — unused by the drain loop itself.
#[derive(Debug, Clone)]
pub struct FetchUpdatesResult {
    pub entities: Vec<Value>,
    pub has_more: bool,
    pub next_offset: Option<u64>,
}

/// Optional pagination/cursor parameters for `FetchUpdates`.
#[derive(Debug, Clone, Default)]
pub struct FetchUpdatesQuery {
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

// =============================================================================
// Adapter trait
// =============================================================================

/// The pluggable transport to the remote service. Concrete transports
/// (REST, GraphQL, WebSocket) are out of scope; callers supply an
/// implementation.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Sends a create mutation for `kind`/`payload`.
    async fn create(&self, kind: &str, payload: &Value) -> AdapterOutcome;

    /// Sends an update mutation for `kind`/`id`/`payload`.
    async fn update(&self, kind: &str, id: &str, payload: &Value) -> AdapterOutcome;

    /// Sends a delete mutation for `kind`/`id`.
    async fn delete(&self, kind: &str, id: &str) -> AdapterOutcome;

    /// Fetches entities updated since a cursor. Used by higher-level
    /// collaborators, not by the drain loop.
    async fn fetch_updates(&self, kind: &str, query: FetchUpdatesQuery) -> Result<FetchUpdatesResult, AdapterOutcome>;

    /// Optional lightweight connectivity check.
    async fn validate_connection(&self) -> bool {
        true
    }
}

/// Reads the mutation kind out of a payload's reserved `_op` marker,
/// defaulting to `Update` when absent.
pub fn infer_mutation_kind(payload: &Value) -> MutationKind {
    match payload.get("_op").and_then(Value::as_str) {
        Some("create") => MutationKind::Create,
        Some("delete") => MutationKind::Delete,
        _ => MutationKind::Update,
    }
}

// =============================================================================
// MockAdapter (test/demo double)
// =============================================================================

/// A scriptable [`Adapter`] for tests and the demo binary: every call pops
/// the next scripted response or falls back to a default.
pub struct MockAdapter {
    responses: tokio::sync::Mutex<std::collections::VecDeque<AdapterOutcome>>,
    default_response: AdapterOutcome,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockAdapter {
    /// An adapter that always returns `Ok(None)`.
    pub fn always_ok() -> Self {
        MockAdapter {
            responses: tokio::sync::Mutex::new(std::collections::VecDeque::new()),
            default_response: AdapterOutcome::Ok(None),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// An adapter that always returns the given outcome.
    pub fn always(outcome: AdapterOutcome) -> Self {
        MockAdapter {
            responses: tokio::sync::Mutex::new(std::collections::VecDeque::new()),
            default_response: outcome,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// An adapter that replays `script` in order, then falls back to
    /// `always_ok` behaviour once exhausted.
    pub fn scripted(script: Vec<AdapterOutcome>) -> Self {
        MockAdapter {
            responses: tokio::sync::Mutex::new(script.into()),
            default_response: AdapterOutcome::Ok(None),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn next_outcome(&self) -> AdapterOutcome {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut responses = self.responses.lock().await;
        responses.pop_front().unwrap_or_else(|| self.default_response.clone())
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn create(&self, _kind: &str, _payload: &Value) -> AdapterOutcome {
        self.next_outcome().await
    }

    async fn update(&self, _kind: &str, _id: &str, _payload: &Value) -> AdapterOutcome {
        self.next_outcome().await
    }

    async fn delete(&self, _kind: &str, _id: &str) -> AdapterOutcome {
        self.next_outcome().await
    }

    async fn fetch_updates(&self, _kind: &str, _query: FetchUpdatesQuery) -> Result<FetchUpdatesResult, AdapterOutcome> {
        Ok(FetchUpdatesResult { entities: vec![], has_more: false, next_offset: None })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_create_delete_and_default_update() {
        assert_eq!(infer_mutation_kind(&json!({"_op": "create"})), MutationKind::Create);
        assert_eq!(infer_mutation_kind(&json!({"_op": "delete"})), MutationKind::Delete);
        assert_eq!(infer_mutation_kind(&json!({"text": "x"})), MutationKind::Update);
    }

    #[tokio::test]
    async fn scripted_adapter_replays_then_falls_back() {
        let adapter = MockAdapter::scripted(vec![AdapterOutcome::RetryableError { code: "503".into(), message: "busy".into() }]);
        let first = adapter.create("todo", &json!({})).await;
        assert!(matches!(first, AdapterOutcome::RetryableError { .. }));
        let second = adapter.create("todo", &json!({})).await;
        assert!(matches!(second, AdapterOutcome::Ok(None)));
        assert_eq!(adapter.call_count(), 2);
    }
}
