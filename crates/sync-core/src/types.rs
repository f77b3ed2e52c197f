//! # Domain Types
//!
//! The outbox entry, its status vocabulary, and the payload accessors that
//! conflict strategies use to read fields out of an otherwise-opaque payload.
//!
//! ## The Outbox Entry
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         OutboxEntry Lifecycle                           │
//! │                                                                         │
//! │   Enqueue                                                              │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  ┌─────────┐  dispatch   ┌─────────┐  success   ┌─────────┐            │
//! │  │ pending │ ──────────► │ syncing │ ─────────► │ synced  │            │
//! │  └────┬────┘              └────┬────┘            └─────────┘            │
//! │       ▲                        │                                       │
//! │       │  retry (attempts < max)│ retryable failure, exhausted           │
//! │       └────────────────────────┤                                       │
//! │                                ▼                                       │
//! │                           ┌─────────┐                                  │
//! │                           │ failed  │ ◄── non-retryable failure        │
//! │                           └─────────┘                                  │
//! │                                │                                       │
//! │                      conflict  ▼                                       │
//! │                           ┌──────────┐   resolved    ┌─────────┐       │
//! │                           │ conflict │ ────────────► │ pending │       │
//! │                           └──────────┘  (re-enqueue) └─────────┘       │
//! │                                                                         │
//! │  `syncing` is never a durable terminal state: on crash recovery every  │
//! │  `syncing` row is promoted back to `pending` with its attempts intact. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::CoreError;

// =============================================================================
// Entry Status
// =============================================================================

/// Lifecycle position of an outbox entry.
///
/// The richer five-state vocabulary (as opposed to a simpler
/// `pending/synced/error` scheme) is used uniformly: `syncing` marks an
/// in-flight attempt, `failed` marks retry exhaustion or a permanent
/// adapter error, and `conflict` marks a row parked for the conflict
/// resolver or for external/manual action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Eligible for the next drain cycle.
    Pending,
    /// In-flight within the current process; never a durable terminal state.
    Syncing,
    /// Transmitted successfully; eligible for garbage collection.
    Synced,
    /// Retries exhausted, or a non-retryable adapter error occurred.
    Failed,
    /// Parked pending conflict resolution or external/manual action.
    Conflict,
}

impl EntryStatus {
    /// Whether this status is eligible to be picked up by a drain cycle.
    pub fn is_drain_eligible(self) -> bool {
        matches!(self, EntryStatus::Pending)
    }

    /// Whether this status is a durable terminal state (never promoted back
    /// to `pending` automatically).
    pub fn is_terminal(self) -> bool {
        matches!(self, EntryStatus::Synced | EntryStatus::Failed)
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Syncing => "syncing",
            EntryStatus::Synced => "synced",
            EntryStatus::Failed => "failed",
            EntryStatus::Conflict => "conflict",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EntryStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "syncing" => Ok(EntryStatus::Syncing),
            "synced" => Ok(EntryStatus::Synced),
            "failed" => Ok(EntryStatus::Failed),
            "conflict" => Ok(EntryStatus::Conflict),
            other => Err(CoreError::Validation(crate::error::ValidationError::NotAllowed {
                field: format!("status ('{other}')"),
                allowed: vec![
                    "pending".into(),
                    "syncing".into(),
                    "synced".into(),
                    "failed".into(),
                    "conflict".into(),
                ],
            })),
        }
    }
}

// =============================================================================
// Outbox Entry
// =============================================================================

/// A single pending (or resolved) mutation awaiting transmission.
///
/// Payloads are opaque from the engine's perspective: a self-describing
/// JSON value. Conflict strategies that need to read fields do so through
/// the accessor functions below, never by assuming a particular shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Stable identity of the mutation, chosen by the caller.
    pub id: String,
    /// Logical collection/table name, opaque to the core.
    pub kind: String,
    /// The mutation body handed to the Adapter.
    pub payload: Value,
    /// Lifecycle position.
    pub status: EntryStatus,
    /// Number of completed transmission attempts.
    pub attempts: i64,
    /// When the most recent attempt began.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Enqueue time; drain order key.
    pub created_at: DateTime<Utc>,
    /// Last mutation of this row.
    pub updated_at: DateTime<Utc>,
}

impl OutboxEntry {
    /// Creates a new entry in `pending` status with `attempts = 0`, as
    /// produced by `Enqueue`.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, payload: Value) -> Self {
        let now = Utc::now();
        OutboxEntry {
            id: id.into(),
            kind: kind.into(),
            payload,
            status: EntryStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Drain order: strictly ascending by `created_at`, with `id` as a
/// deterministic tiebreak.
pub fn drain_cmp(a: &OutboxEntry, b: &OutboxEntry) -> Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

// =============================================================================
// Payload Accessors
// =============================================================================

/// Reads an `updated_at` field out of a payload, accepting either an
/// RFC3339 string or an integer count of milliseconds since the epoch.
///
/// Used by the `timestamp-wins` and `smart-merge` conflict strategies.
pub fn payload_updated_at(payload: &Value) -> Option<DateTime<Utc>> {
    let raw = payload.get("updated_at")?;
    if let Some(s) = raw.as_str() {
        return DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc));
    }
    if let Some(ms) = raw.as_i64() {
        return DateTime::from_timestamp_millis(ms);
    }
    None
}

/// Reads a named integer field out of a payload. Used by the
/// `version-based` conflict strategy.
pub fn payload_version(payload: &Value, field: &str) -> Option<i64> {
    payload.get(field)?.as_i64()
}

/// Shallow field-wise merge: `overlay` fields win over `base` fields.
///
/// Used directly by the `merge` strategy (server as base, local as
/// overlay) and as a building block for `smart-merge`.
pub fn shallow_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (k, v) in overlay_map {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

/// Smart merge: start from a shallow merge with `local` as the overlay,
/// then for each of `keys` take the value from whichever side has the
/// greater `updated_at`.
pub fn smart_merge(server: &Value, local: &Value, keys: &[String]) -> Value {
    let mut merged = shallow_merge(server, local);
    let server_newer = match (payload_updated_at(server), payload_updated_at(local)) {
        (Some(s), Some(l)) => s > l,
        (Some(_), None) => true,
        _ => false,
    };
    if server_newer {
        if let (Value::Object(merged_map), Value::Object(server_map)) = (&mut merged, server) {
            let key_set: BTreeSet<&String> = keys.iter().collect();
            for (k, v) in server_map {
                if key_set.contains(k) {
                    merged_map.insert(k.clone(), v.clone());
                }
            }
        }
    }
    merged
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_entry_is_pending_with_zero_attempts() {
        let entry = OutboxEntry::new("a", "todo", json!({"text": "x"}));
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.attempts, 0);
        assert!(entry.last_attempt_at.is_none());
    }

    #[test]
    fn status_round_trips_through_string() {
        for s in [
            EntryStatus::Pending,
            EntryStatus::Syncing,
            EntryStatus::Synced,
            EntryStatus::Failed,
            EntryStatus::Conflict,
        ] {
            let parsed: EntryStatus = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn drain_order_is_created_at_then_id() {
        let mut a = OutboxEntry::new("b", "k", json!({}));
        let mut b = OutboxEntry::new("a", "k", json!({}));
        a.created_at = DateTime::from_timestamp_millis(100).unwrap();
        b.created_at = DateTime::from_timestamp_millis(100).unwrap();
        // same timestamp: id "a" sorts before "b"
        assert_eq!(drain_cmp(&a, &b), Ordering::Greater);
    }

    #[test]
    fn payload_updated_at_reads_millis_and_rfc3339() {
        let v1 = json!({"updated_at": 1_700_000_000_000i64});
        assert!(payload_updated_at(&v1).is_some());

        let v2 = json!({"updated_at": "2023-11-14T22:13:20Z"});
        assert!(payload_updated_at(&v2).is_some());

        let v3 = json!({"other": 1});
        assert!(payload_updated_at(&v3).is_none());
    }

    #[test]
    fn shallow_merge_overlay_wins() {
        let server = json!({"name": "server", "stock": 5});
        let local = json!({"name": "local"});
        let merged = shallow_merge(&server, &local);
        assert_eq!(merged["name"], "local");
        assert_eq!(merged["stock"], 5);
    }

    #[test]
    fn smart_merge_takes_named_keys_from_newer_side() {
        let server = json!({"updated_at": 200, "price": 10, "name": "server"});
        let local = json!({"updated_at": 100, "price": 12, "name": "local"});
        let merged = smart_merge(&server, &local, &["price".to_string()]);
        // local overlays first, then price is pulled from server (newer)
        assert_eq!(merged["price"], 10);
        assert_eq!(merged["name"], "local");
    }
}
