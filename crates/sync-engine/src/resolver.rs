//! # Conflict Resolver
//!
//! Strategy-driven merge of a local mutation against the server's current
//! state for the same id. Strategies are deterministic and perform no I/O.
//!
//! ## Resolution Outcomes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     ConflictResolver::resolve                           │
//! │                                                                         │
//! │  ResolutionInput { local entry, server_state }                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐                  │
//! │  │ ReEnqueue   │   │ Drop        │   │ Park        │                  │
//! │  │ (pending,   │   │ (server     │   │ (conflict   │                  │
//! │  │ attempts=0) │   │ wins)       │   │ status)     │                  │
//! │  └─────────────┘   └─────────────┘   └─────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde_json::Value;
use sync_core::{payload_updated_at, payload_version, shallow_merge, smart_merge, OutboxEntry};

// =============================================================================
// Input / Output
// =============================================================================

/// The local entry and the server-reported current state for the same id,
/// as handed to a conflict strategy.
#[derive(Debug, Clone)]
pub struct ResolutionInput {
    pub local: OutboxEntry,
    pub server_state: Value,
}

/// The resolver's decision for a conflicted entry.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Re-enqueue the given entry in `pending` status with `attempts = 0`.
    ReEnqueue(OutboxEntry),
    /// Drop the local mutation; the server state is authoritative.
    Drop,
    /// Park the entry in `conflict` status pending external action.
    Park,
}

/// A caller-supplied deterministic resolution function, used by the
/// `custom(fn)` strategy.
pub type CustomResolverFn = Arc<dyn Fn(&ResolutionInput) -> Resolution + Send + Sync>;

// =============================================================================
// Strategy
// =============================================================================

/// One of the eight built-in conflict strategies, exactly one active per
/// resolver instance.
#[derive(Clone)]
pub enum ConflictStrategy {
    ClientWins,
    ServerWins,
    TimestampWins,
    VersionBased { field: String },
    Merge,
    SmartMerge { keys: Vec<String> },
    Manual,
    Custom(CustomResolverFn),
}

impl std::fmt::Debug for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictStrategy::ClientWins => write!(f, "ClientWins"),
            ConflictStrategy::ServerWins => write!(f, "ServerWins"),
            ConflictStrategy::TimestampWins => write!(f, "TimestampWins"),
            ConflictStrategy::VersionBased { field } => write!(f, "VersionBased({field})"),
            ConflictStrategy::Merge => write!(f, "Merge"),
            ConflictStrategy::SmartMerge { keys } => write!(f, "SmartMerge({keys:?})"),
            ConflictStrategy::Manual => write!(f, "Manual"),
            ConflictStrategy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

// =============================================================================
// Conflict Resolver
// =============================================================================

/// Strategy-driven merge of local mutation against server's current state.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    pub fn new(strategy: ConflictStrategy) -> Self {
        ConflictResolver { strategy }
    }

    /// Resolves the conflict deterministically. Never performs I/O.
    pub fn resolve(&self, input: &ResolutionInput) -> Resolution {
        match &self.strategy {
            ConflictStrategy::ClientWins => {
                Resolution::ReEnqueue(reset_for_reenqueue(input.local.clone(), input.local.payload.clone()))
            }
            ConflictStrategy::ServerWins => Resolution::Drop,
            ConflictStrategy::TimestampWins => {
                let local_ts = payload_updated_at(&input.local.payload);
                let server_ts = payload_updated_at(&input.server_state);
                // "ties go to server"
                let local_wins = matches!((local_ts, server_ts), (Some(l), Some(s)) if l > s)
                    || (local_ts.is_some() && server_ts.is_none());
                if local_wins {
                    Resolution::ReEnqueue(reset_for_reenqueue(input.local.clone(), input.local.payload.clone()))
                } else {
                    Resolution::Drop
                }
            }
            ConflictStrategy::VersionBased { field } => {
                let local_v = payload_version(&input.local.payload, field);
                let server_v = payload_version(&input.server_state, field);
                let local_wins = matches!((local_v, server_v), (Some(l), Some(s)) if l > s)
                    || (local_v.is_some() && server_v.is_none());
                if local_wins {
                    Resolution::ReEnqueue(reset_for_reenqueue(input.local.clone(), input.local.payload.clone()))
                } else {
                    Resolution::Drop
                }
            }
            ConflictStrategy::Merge => {
                let merged = shallow_merge(&input.server_state, &input.local.payload);
                Resolution::ReEnqueue(reset_for_reenqueue(input.local.clone(), merged))
            }
            ConflictStrategy::SmartMerge { keys } => {
                let merged = smart_merge(&input.server_state, &input.local.payload, keys);
                Resolution::ReEnqueue(reset_for_reenqueue(input.local.clone(), merged))
            }
            ConflictStrategy::Manual => Resolution::Park,
            ConflictStrategy::Custom(f) => f(input),
        }
    }
}

/// Resets the bookkeeping fields a re-enqueue requires: `status = pending`,
/// `attempts = 0` for a fresh drain attempt.
fn reset_for_reenqueue(mut entry: OutboxEntry, payload: Value) -> OutboxEntry {
    entry.payload = payload;
    entry.status = sync_core::EntryStatus::Pending;
    entry.attempts = 0;
    entry.last_attempt_at = None;
    entry
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sync_core::EntryStatus;

    fn local_entry(payload: Value) -> OutboxEntry {
        let mut e = OutboxEntry::new("b", "todo", payload);
        e.attempts = 2;
        e
    }

    #[test]
    fn client_wins_reenqueues_local_payload_unchanged() {
        let resolver = ConflictResolver::new(ConflictStrategy::ClientWins);
        let input = ResolutionInput { local: local_entry(json!({"text": "local"})), server_state: json!({"text": "server"}) };
        match resolver.resolve(&input) {
            Resolution::ReEnqueue(entry) => {
                assert_eq!(entry.payload["text"], "local");
                assert_eq!(entry.attempts, 0);
                assert_eq!(entry.status, EntryStatus::Pending);
            }
            other => panic!("expected ReEnqueue, got {other:?}"),
        }
    }

    #[test]
    fn server_wins_drops_local() {
        let resolver = ConflictResolver::new(ConflictStrategy::ServerWins);
        let input = ResolutionInput { local: local_entry(json!({})), server_state: json!({}) };
        assert!(matches!(resolver.resolve(&input), Resolution::Drop));
    }

    #[test]
    fn timestamp_wins_ties_go_to_server() {
        let resolver = ConflictResolver::new(ConflictStrategy::TimestampWins);
        let input = ResolutionInput {
            local: local_entry(json!({"updated_at": 100})),
            server_state: json!({"updated_at": 100}),
        };
        assert!(matches!(resolver.resolve(&input), Resolution::Drop));
    }

    #[test]
    fn timestamp_wins_local_newer_reenqueues() {
        let resolver = ConflictResolver::new(ConflictStrategy::TimestampWins);
        let input = ResolutionInput {
            local: local_entry(json!({"updated_at": 200})),
            server_state: json!({"updated_at": 100}),
        };
        assert!(matches!(resolver.resolve(&input), Resolution::ReEnqueue(_)));
    }

    #[test]
    fn version_based_compares_named_field() {
        let resolver = ConflictResolver::new(ConflictStrategy::VersionBased { field: "v".to_string() });
        let input = ResolutionInput { local: local_entry(json!({"v": 1})), server_state: json!({"v": 5}) };
        assert!(matches!(resolver.resolve(&input), Resolution::Drop));
    }

    #[test]
    fn manual_parks_entry() {
        let resolver = ConflictResolver::new(ConflictStrategy::Manual);
        let input = ResolutionInput { local: local_entry(json!({})), server_state: json!({}) };
        assert!(matches!(resolver.resolve(&input), Resolution::Park));
    }

    #[test]
    fn merge_overlays_local_onto_server() {
        let resolver = ConflictResolver::new(ConflictStrategy::Merge);
        let input = ResolutionInput {
            local: local_entry(json!({"name": "local"})),
            server_state: json!({"name": "server", "stock": 5}),
        };
        match resolver.resolve(&input) {
            Resolution::ReEnqueue(entry) => {
                assert_eq!(entry.payload["name"], "local");
                assert_eq!(entry.payload["stock"], 5);
            }
            other => panic!("expected ReEnqueue, got {other:?}"),
        }
    }

    #[test]
    fn custom_strategy_invokes_supplied_function() {
        let custom: CustomResolverFn = Arc::new(|_input| Resolution::Park);
        let resolver = ConflictResolver::new(ConflictStrategy::Custom(custom));
        let input = ResolutionInput { local: local_entry(json!({})), server_state: json!({}) };
        assert!(matches!(resolver.resolve(&input), Resolution::Park));
    }
}
