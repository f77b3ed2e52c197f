//! # Network Observer
//!
//! Tracks online/offline transitions and offers a forced override for
//! testing. Listener delivery runs through an unbounded `tokio::sync::mpsc`
//! fan-out rather than direct synchronous callback invocation, so the
//! constraint that listeners must not re-enter the coordinator synchronously
//! is structurally true rather than a documented obligation.
//!
//! ## State
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      NetworkObserver State                              │
//! │                                                                         │
//! │  actual: AtomicBool  ──── updated by Probe()                           │
//! │  forced: RwLock<Option<bool>>  ──── set by SetForced()                 │
//! │                                                                         │
//! │  IsOnline() = forced.unwrap_or(actual)                                 │
//! │                                                                         │
//! │  on change ──► broadcast to every listener's mpsc::UnboundedSender      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::{debug, info};

/// A connectivity transition delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityChange {
    pub online: bool,
}

/// A handle to a listener's delivery channel, returned by `subscribe` and
/// consumed by `unsubscribe`.
pub type ListenerId = u64;

struct Listener {
    id: ListenerId,
    sender: mpsc::UnboundedSender<ConnectivityChange>,
}

/// Tracks online/offline transitions; offers forced-override for testing.
///
/// The connectivity probe itself is injected as a closure — this crate
/// does not bundle a concrete OS connectivity check — callers own that.
pub struct NetworkObserver {
    actual: AtomicBool,
    forced: RwLock<Option<bool>>,
    listeners: RwLock<Vec<Listener>>,
    id_counter: std::sync::atomic::AtomicU64,
    probe_fn: Box<dyn Fn() -> bool + Send + Sync>,
}

impl NetworkObserver {
    /// Creates an observer with a caller-supplied connectivity probe and an
    /// initial cached value.
    pub fn new(initial_online: bool, probe_fn: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        NetworkObserver {
            actual: AtomicBool::new(initial_online),
            forced: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
            id_counter: std::sync::atomic::AtomicU64::new(0),
            probe_fn: Box::new(probe_fn),
        }
    }

    /// An observer that never probes externally; stays at `initial_online`
    /// and is driven purely through `SetForced` (used in tests and by the
    /// demo). Its probe closure always returns `initial_online` so that a
    /// stray `init()`/`probe()` call cannot drift the cached state.
    pub fn manual(initial_online: bool) -> Self {
        NetworkObserver::new(initial_online, move || initial_online)
    }

    /// Subscribes to the host connectivity source; caches current state.
    /// Idempotent: calling more than once simply re-caches.
    pub async fn init(&self) {
        let observed = (self.probe_fn)();
        self.actual.store(observed, Ordering::SeqCst);
        info!(online = observed, "network observer initialized");
    }

    /// Last-known boolean. Constant-time, non-blocking.
    pub async fn is_online(&self) -> bool {
        if let Some(forced) = *self.forced.read().await {
            return forced;
        }
        self.actual.load(Ordering::SeqCst)
    }

    /// Forces a fresh connectivity check; updates the cache and notifies
    /// listeners if the observable value changed.
    pub async fn probe(&self) -> bool {
        let before = self.is_online().await;
        let observed = (self.probe_fn)();
        self.actual.store(observed, Ordering::SeqCst);
        let after = self.is_online().await;
        if before != after {
            self.notify(after).await;
        }
        after
    }

    /// `Some(true)`/`Some(false)` pins the observable value regardless of
    /// actual connectivity; `None` clears the override.
    pub async fn set_forced(&self, value: Option<bool>) {
        let before = self.is_online().await;
        *self.forced.write().await = value;
        let after = self.is_online().await;
        debug!(?value, before, after, "network override changed");
        if before != after {
            self.notify(after).await;
        }
    }

    /// Registers a listener; returns an id for later `unsubscribe` and the
    /// receiving half of its delivery channel.
    pub async fn subscribe(&self) -> (ListenerId, mpsc::UnboundedReceiver<ConnectivityChange>) {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.write().await.push(Listener { id, sender: tx });
        (id, rx)
    }

    /// Removes a previously registered listener.
    pub async fn unsubscribe(&self, id: ListenerId) {
        self.listeners.write().await.retain(|l| l.id != id);
    }

    /// Completes when `is_online()` becomes true or `timeout_duration` elapses.
    pub async fn wait_for_online(&self, timeout_duration: Duration) -> bool {
        if self.is_online().await {
            return true;
        }
        let (id, mut rx) = self.subscribe().await;
        let result = timeout(timeout_duration, async {
            while let Some(change) = rx.recv().await {
                if change.online {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        self.unsubscribe(id).await;
        result
    }

    async fn notify(&self, online: bool) {
        let listeners = self.listeners.read().await;
        for listener in listeners.iter() {
            let _ = listener.sender.send(ConnectivityChange { online });
        }
    }
}

impl std::fmt::Debug for NetworkObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkObserver").field("actual", &self.actual.load(Ordering::SeqCst)).finish_non_exhaustive()
    }
}

/// Convenience for embedding in an `Arc` shared between the coordinator and
/// any caller-supplied application-lifecycle glue.
pub type SharedNetworkObserver = Arc<NetworkObserver>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forced_override_wins_over_actual_state() {
        let observer = NetworkObserver::new(true, || true);
        observer.init().await;
        observer.set_forced(Some(false)).await;
        assert!(!observer.is_online().await);
        observer.set_forced(None).await;
        assert!(observer.is_online().await);
    }

    #[tokio::test]
    async fn probe_updates_cache_and_notifies_on_change() {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();
        let observer = NetworkObserver::new(false, move || flag_clone.load(Ordering::SeqCst));
        observer.init().await;
        assert!(!observer.is_online().await);

        let (_id, mut rx) = observer.subscribe().await;
        flag.store(true, Ordering::SeqCst);
        let result = observer.probe().await;
        assert!(result);

        let change = rx.recv().await.unwrap();
        assert!(change.online);
    }

    #[tokio::test]
    async fn wait_for_online_completes_when_forced_true() {
        let observer = Arc::new(NetworkObserver::manual(false));
        let observer2 = observer.clone();
        let handle = tokio::spawn(async move { observer2.wait_for_online(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        observer.set_forced(Some(true)).await;

        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn wait_for_online_times_out_when_offline() {
        let observer = NetworkObserver::manual(false);
        let result = observer.wait_for_online(Duration::from_millis(50)).await;
        assert!(!result);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let observer = NetworkObserver::manual(false);
        let (id, mut rx) = observer.subscribe().await;
        observer.unsubscribe(id).await;
        observer.set_forced(Some(true)).await;
        assert!(rx.recv().await.is_none() || tokio::time::timeout(Duration::from_millis(20), rx.recv()).await.is_err());
    }
}
