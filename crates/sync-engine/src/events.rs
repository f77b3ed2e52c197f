//! # Events and Hooks
//!
//! The coordinator's observable surface: a broadcast [`Event`] stream for
//! subscribers, and an optional [`Hooks`] bundle of synchronous callbacks
//! invoked inline during a drain cycle.
//!
//! Hooks are best-effort: a panic inside one is caught, logged, and
//! swallowed — a misbehaving hook must never abort a drain cycle.

use std::panic::{catch_unwind, AssertUnwindSafe};

use sync_core::OutboxEntry;
use tracing::error;

// =============================================================================
// Event
// =============================================================================

/// Something the coordinator observed, broadcast to every subscriber.
#[derive(Debug, Clone)]
pub enum Event {
    /// A drain cycle began.
    SyncStarted,
    /// A drain cycle finished; `synced` and `errors` count entries processed
    /// in that cycle only.
    SyncCompleted { synced: u64, errors: u64 },
    /// A drain cycle aborted before completing its batch.
    SyncFailed { error: String },
    /// A mutation was accepted into the outbox.
    ItemQueued { id: String, kind: String },
    /// An entry transmitted successfully.
    ItemSynced { entry: OutboxEntry },
    /// An entry failed (retryable-pending-retry or terminally failed).
    ItemFailed { entry: OutboxEntry, error: String },
    /// The network observer's online/offline state changed.
    ConnectionChanged { online: bool },
    /// The outbox's aggregate status counts changed.
    QueueChanged { status: sync_store::OutboxStats },
}

// =============================================================================
// Hooks
// =============================================================================

type BeforeSyncHook = Box<dyn Fn() + Send + Sync>;
type SyncSuccessHook = Box<dyn Fn(&OutboxEntry) + Send + Sync>;
type SyncErrorHook = Box<dyn Fn(&OutboxEntry, &str) + Send + Sync>;
type QueueChangeHook = Box<dyn Fn(&sync_store::OutboxStats) + Send + Sync>;
type ConnectionChangeHook = Box<dyn Fn(bool) + Send + Sync>;

/// Optional synchronous callbacks invoked at fixed points in a drain cycle.
/// Every field is independently optional; unset hooks are no-ops.
#[derive(Default)]
pub struct Hooks {
    pub on_before_sync: Option<BeforeSyncHook>,
    pub on_sync_success: Option<SyncSuccessHook>,
    pub on_sync_error: Option<SyncErrorHook>,
    pub on_queue_change: Option<QueueChangeHook>,
    pub on_connection_change: Option<ConnectionChangeHook>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_before_sync", &self.on_before_sync.is_some())
            .field("on_sync_success", &self.on_sync_success.is_some())
            .field("on_sync_error", &self.on_sync_error.is_some())
            .field("on_queue_change", &self.on_queue_change.is_some())
            .field("on_connection_change", &self.on_connection_change.is_some())
            .finish()
    }
}

impl Hooks {
    pub fn new() -> Self {
        Hooks::default()
    }

    pub fn on_before_sync(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_before_sync = Some(Box::new(f));
        self
    }

    pub fn on_sync_success(mut self, f: impl Fn(&OutboxEntry) + Send + Sync + 'static) -> Self {
        self.on_sync_success = Some(Box::new(f));
        self
    }

    pub fn on_sync_error(mut self, f: impl Fn(&OutboxEntry, &str) + Send + Sync + 'static) -> Self {
        self.on_sync_error = Some(Box::new(f));
        self
    }

    pub fn on_queue_change(mut self, f: impl Fn(&sync_store::OutboxStats) + Send + Sync + 'static) -> Self {
        self.on_queue_change = Some(Box::new(f));
        self
    }

    pub fn on_connection_change(mut self, f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_connection_change = Some(Box::new(f));
        self
    }

    pub(crate) fn fire_before_sync(&self) {
        if let Some(hook) = &self.on_before_sync {
            if catch_unwind(AssertUnwindSafe(|| hook())).is_err() {
                error!("on_before_sync hook panicked");
            }
        }
    }

    pub(crate) fn fire_sync_success(&self, entry: &OutboxEntry) {
        if let Some(hook) = &self.on_sync_success {
            if catch_unwind(AssertUnwindSafe(|| hook(entry))).is_err() {
                error!("on_sync_success hook panicked");
            }
        }
    }

    pub(crate) fn fire_sync_error(&self, entry: &OutboxEntry, message: &str) {
        if let Some(hook) = &self.on_sync_error {
            if catch_unwind(AssertUnwindSafe(|| hook(entry, message))).is_err() {
                error!("on_sync_error hook panicked");
            }
        }
    }

    pub(crate) fn fire_queue_change(&self, stats: &sync_store::OutboxStats) {
        if let Some(hook) = &self.on_queue_change {
            if catch_unwind(AssertUnwindSafe(|| hook(stats))).is_err() {
                error!("on_queue_change hook panicked");
            }
        }
    }

    pub(crate) fn fire_connection_change(&self, online: bool) {
        if let Some(hook) = &self.on_connection_change {
            if catch_unwind(AssertUnwindSafe(|| hook(online))).is_err() {
                error!("on_connection_change hook panicked");
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
