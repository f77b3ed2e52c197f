//! # Outbox Store
//!
//! The `OutboxStore` trait and its two implementations: `SqliteOutboxStore`
//! (backed by a pooled SQLite connection) and `InMemoryOutboxStore` (a
//! `Mutex<Vec<OutboxEntry>>` fake for coordinator tests that don't want to
//! touch a real database).
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Outbox Store                               │
//! │                                                                         │
//! │  SyncCoordinator                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  dyn OutboxStore ─── Init / Put / NextBatch / SetStatus / Get /        │
//! │       │              Delete / DeleteWhere / Stats / Close              │
//! │       │                                                                 │
//! │       ├──► SqliteOutboxStore  (production: SqlitePool, WAL mode)       │
//! │       └──► InMemoryOutboxStore (tests: Mutex<Vec<OutboxEntry>>)        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled for:
//! - Better concurrent read performance
//! - Readers don't block writers
//! - Writers don't block readers
//! - Better crash recovery

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use sync_core::{drain_cmp, EntryStatus, OutboxEntry};
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::migrations;

// =============================================================================
// Stats
// =============================================================================

/// Counts of outbox entries grouped by status, as returned by `Stats()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxStats {
    pub pending: u64,
    pub syncing: u64,
    pub synced: u64,
    pub failed: u64,
    pub conflict: u64,
}

impl OutboxStats {
    pub fn total(&self) -> u64 {
        self.pending + self.syncing + self.synced + self.failed + self.conflict
    }

    fn bump(&mut self, status: EntryStatus) {
        match status {
            EntryStatus::Pending => self.pending += 1,
            EntryStatus::Syncing => self.syncing += 1,
            EntryStatus::Synced => self.synced += 1,
            EntryStatus::Failed => self.failed += 1,
            EntryStatus::Conflict => self.conflict += 1,
        }
    }
}

// =============================================================================
// OutboxStore trait (C1 contract)
// =============================================================================

/// Durable append-and-mutate log of pending mutations, indexed by status
/// and creation order.
///
/// Implementations must guarantee: `Init()` is idempotent and promotes any
/// `syncing` row to `pending` on recovery without touching `attempts`;
/// `Put()` upserts by `id` and resets `attempts` to zero when overwriting a
/// non-terminal row; `NextBatch()` never mutates state, only reads.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Idempotent setup: creates backing storage, runs the crash-recovery
    /// scan (`syncing` → `pending`, `attempts` untouched).
    async fn init(&self) -> StorageResult<()>;

    /// Upserts by `id`, setting `updated_at` to now. If a non-terminal row
    /// existed under this id, `attempts` resets to 0.
    async fn put(&self, entry: OutboxEntry) -> StorageResult<()>;

    /// Returns up to `limit` entries with status `pending`, ordered by
    /// `(created_at asc, id asc)`. Does not mutate state.
    async fn next_batch(&self, limit: usize) -> StorageResult<Vec<OutboxEntry>>;

    /// Atomic status transition. Bumps `attempts` when `bump_attempts` is
    /// true; sets `last_attempt_at` to now when `new_status` is `Syncing`.
    async fn set_status(
        &self,
        id: &str,
        new_status: EntryStatus,
        bump_attempts: bool,
    ) -> StorageResult<()>;

    /// Fetches a single entry by id.
    async fn get(&self, id: &str) -> StorageResult<Option<OutboxEntry>>;

    /// Returns every entry currently in the given status, in no particular
    /// order. Used by `RetryFailed` to find failed entries to reset.
    async fn list_by_status(&self, status: EntryStatus) -> StorageResult<Vec<OutboxEntry>>;

    /// Removes a single entry by id. A missing id is not an error.
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Removes every entry currently in the given status.
    async fn delete_where(&self, status: EntryStatus) -> StorageResult<u64>;

    /// Counts grouped by status.
    async fn stats(&self) -> StorageResult<OutboxStats>;

    /// Releases any held resources. Further calls may error.
    async fn close(&self) -> StorageResult<()>;
}

// =============================================================================
// SQLite configuration
// =============================================================================

/// Configuration for the SQLite-backed outbox store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// Minimum number of pooled connections kept alive.
    pub min_connections: u32,
    /// Acquire timeout for a pooled connection.
    pub connect_timeout: Duration,
    /// Idle timeout before a pooled connection is closed.
    pub idle_timeout: Duration,
    /// Whether `init()` should run embedded migrations.
    pub run_migrations: bool,
}

impl StoreConfig {
    /// Creates a configuration pointing at a file-backed database.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Configuration for an isolated in-memory SQLite database (tests).
    pub fn in_memory() -> Self {
        StoreConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }
}

// =============================================================================
// SqliteOutboxStore
// =============================================================================

/// SQLite-backed implementation of [`OutboxStore`], using runtime (not
/// compile-time macro) `sqlx` queries throughout.
#[derive(Debug, Clone)]
pub struct SqliteOutboxStore {
    pool: SqlitePool,
}

impl SqliteOutboxStore {
    /// Opens (creating if necessary) the database described by `config`
    /// and builds the connection pool. Does not run migrations; call
    /// [`OutboxStore::init`] for that.
    pub async fn connect(config: StoreConfig) -> StorageResult<Self> {
        info!(path = %config.database_path.display(), "opening outbox store");

        let connect_url = if config.database_path.as_os_str() == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", config.database_path.display())
        };

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let store = SqliteOutboxStore { pool };
        if config.run_migrations {
            migrations::run_migrations(&store.pool).await?;
        }
        Ok(store)
    }

    /// Direct pool access for callers that need a raw connection (health
    /// checks, diagnostics).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> StorageResult<OutboxEntry> {
        let id: String = row.try_get("id")?;
        let status_raw: String = row.try_get("status")?;
        let status = EntryStatus::from_str(&status_raw)
            .map_err(|_| StorageError::CorruptStatus { id: id.clone(), raw: status_raw })?;
        let payload_raw: String = row.try_get("payload")?;
        let payload = serde_json::from_str(&payload_raw)
            .map_err(|e| StorageError::Internal(format!("corrupt payload for {id}: {e}")))?;

        Ok(OutboxEntry {
            id,
            kind: row.try_get("kind")?,
            payload,
            status,
            attempts: row.try_get("attempts")?,
            last_attempt_at: row.try_get("last_attempt_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OutboxStore for SqliteOutboxStore {
    async fn init(&self) -> StorageResult<()> {
        migrations::run_migrations(&self.pool).await?;

        let recovered = sqlx::query(
            "UPDATE sync_outbox SET status = 'pending', updated_at = ?1 WHERE status = 'syncing'",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if recovered > 0 {
            info!(recovered, "promoted in-flight entries back to pending on init");
        }
        Ok(())
    }

    async fn put(&self, entry: OutboxEntry) -> StorageResult<()> {
        debug!(id = %entry.id, kind = %entry.kind, "upserting outbox entry");
        let payload_json = serde_json::to_string(&entry.payload)
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO sync_outbox (id, kind, payload, status, attempts, last_attempt_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                payload = excluded.payload,
                status = excluded.status,
                attempts = CASE WHEN sync_outbox.status NOT IN ('synced', 'failed') THEN 0 ELSE excluded.attempts END,
                last_attempt_at = excluded.last_attempt_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.kind)
        .bind(&payload_json)
        .bind(entry.status.to_string())
        .bind(entry.attempts)
        .bind(entry.last_attempt_at)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn next_batch(&self, limit: usize) -> StorageResult<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            "SELECT id, kind, payload, status, attempts, last_attempt_at, created_at, updated_at \
             FROM sync_outbox WHERE status = 'pending' ORDER BY created_at ASC, id ASC LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = rows.iter().map(Self::row_to_entry).collect::<StorageResult<Vec<_>>>()?;
        entries.sort_by(drain_cmp);
        Ok(entries)
    }

    async fn set_status(&self, id: &str, new_status: EntryStatus, bump_attempts: bool) -> StorageResult<()> {
        let now = Utc::now();
        let attempted_at: Option<DateTime<Utc>> = if new_status == EntryStatus::Syncing { Some(now) } else { None };

        let result = if bump_attempts {
            if new_status == EntryStatus::Syncing {
                sqlx::query(
                    "UPDATE sync_outbox SET status = ?2, attempts = attempts + 1, last_attempt_at = ?3, updated_at = ?4 WHERE id = ?1",
                )
                .bind(id)
                .bind(new_status.to_string())
                .bind(attempted_at)
                .bind(now)
                .execute(&self.pool)
                .await?
            } else {
                sqlx::query(
                    "UPDATE sync_outbox SET status = ?2, attempts = attempts + 1, updated_at = ?3 WHERE id = ?1",
                )
                .bind(id)
                .bind(new_status.to_string())
                .bind(now)
                .execute(&self.pool)
                .await?
            }
        } else if new_status == EntryStatus::Syncing {
            sqlx::query(
                "UPDATE sync_outbox SET status = ?2, last_attempt_at = ?3, updated_at = ?4 WHERE id = ?1",
            )
            .bind(id)
            .bind(new_status.to_string())
            .bind(attempted_at)
            .bind(now)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query("UPDATE sync_outbox SET status = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(id)
                .bind(new_status.to_string())
                .bind(now)
                .execute(&self.pool)
                .await?
        };

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(id));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<OutboxEntry>> {
        let row = sqlx::query(
            "SELECT id, kind, payload, status, attempts, last_attempt_at, created_at, updated_at FROM sync_outbox WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM sync_outbox WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_by_status(&self, status: EntryStatus) -> StorageResult<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            "SELECT id, kind, payload, status, attempts, last_attempt_at, created_at, updated_at \
             FROM sync_outbox WHERE status = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn delete_where(&self, status: EntryStatus) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM sync_outbox WHERE status = ?1")
            .bind(status.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> StorageResult<OutboxStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) as n FROM sync_outbox GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = OutboxStats::default();
        for row in rows {
            let status_raw: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            if let Ok(status) = EntryStatus::from_str(&status_raw) {
                for _ in 0..n {
                    stats.bump(status);
                }
            }
        }
        Ok(stats)
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing outbox store");
        self.pool.close().await;
        Ok(())
    }
}

// =============================================================================
// InMemoryOutboxStore (test fake)
// =============================================================================

/// In-memory [`OutboxStore`] fake for coordinator tests. Mirrors the exact
/// ordering and upsert semantics of [`SqliteOutboxStore`] without touching
/// a real database.
#[derive(Debug, Default)]
pub struct InMemoryOutboxStore {
    rows: Mutex<HashMap<String, OutboxEntry>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        InMemoryOutboxStore { rows: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn init(&self) -> StorageResult<()> {
        let mut rows = self.rows.lock().unwrap();
        for entry in rows.values_mut() {
            if entry.status == EntryStatus::Syncing {
                entry.status = EntryStatus::Pending;
                entry.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn put(&self, mut entry: OutboxEntry) -> StorageResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.get(&entry.id) {
            if !existing.status.is_terminal() {
                entry.attempts = 0;
            }
        }
        entry.updated_at = Utc::now();
        rows.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn next_batch(&self, limit: usize) -> StorageResult<Vec<OutboxEntry>> {
        let rows = self.rows.lock().unwrap();
        let mut pending: Vec<OutboxEntry> = rows
            .values()
            .filter(|e| e.status == EntryStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(drain_cmp);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn set_status(&self, id: &str, new_status: EntryStatus, bump_attempts: bool) -> StorageResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let entry = rows.get_mut(id).ok_or_else(|| StorageError::not_found(id))?;
        entry.status = new_status;
        if bump_attempts {
            entry.attempts += 1;
        }
        if new_status == EntryStatus::Syncing {
            entry.last_attempt_at = Some(Utc::now());
        }
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<OutboxEntry>> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.rows.lock().unwrap().remove(id);
        Ok(())
    }

    async fn list_by_status(&self, status: EntryStatus) -> StorageResult<Vec<OutboxEntry>> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<OutboxEntry> = rows.values().filter(|e| e.status == status).cloned().collect();
        matching.sort_by(drain_cmp);
        Ok(matching)
    }

    async fn delete_where(&self, status: EntryStatus) -> StorageResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, e| e.status != status);
        Ok((before - rows.len()) as u64)
    }

    async fn stats(&self) -> StorageResult<OutboxStats> {
        let rows = self.rows.lock().unwrap();
        let mut stats = OutboxStats::default();
        for entry in rows.values() {
            stats.bump(entry.status);
        }
        Ok(stats)
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
