//! Connection hub: the process-wide table of active duplex connections,
//! keyed by `(adventureId, token)`. Mutated only on accept/close and by the
//! periodic heartbeat sweep; the websocket transport itself lives in
//! `api::ws`, kept out of this module so the registry and its policies
//! stay testable without an axum socket.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Heartbeat scan cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// A connection whose last ping is older than this is considered dead.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

/// A pending close request: the protocol-level status code plus a
/// human-readable reason, delivered to the connection's reader task over a
/// watch channel so it can be applied as a close frame.
pub type CloseRequest = Option<(u16, String)>;

fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

struct Entry {
    last_ping_epoch_ms: AtomicI64,
    close_tx: watch::Sender<CloseRequest>,
}

/// The one process-wide piece of mutable state the engine keeps outside a
/// session: the active-connection mapping.
pub struct ConnectionHub {
    allowed_origins: Vec<String>,
    max_connections: usize,
    entries: DashMap<(String, String), Entry>,
    draining: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// Rejects the second binding of the same `(adventureId, token)` pair
    /// rather than permitting two independent writers (see DESIGN.md).
    DuplicateBinding,
    AtCapacity,
    Draining,
}

/// Handed back on successful registration; the caller keeps the receiver
/// to hear about heartbeat/shutdown-driven closes, and must call
/// [`ConnectionHub::unregister`] with the same key when the connection ends.
pub struct Registration {
    pub key: (String, String),
    pub close_rx: watch::Receiver<CloseRequest>,
}

impl ConnectionHub {
    pub fn new(allowed_origins: Vec<String>, max_connections: usize) -> Self {
        Self {
            allowed_origins,
            max_connections,
            entries: DashMap::new(),
            draining: CancellationToken::new(),
        }
    }

    /// A token that fires once shutdown draining begins, for tasks (the
    /// heartbeat sweep, `main`'s accept loop) that need to race it against
    /// other futures rather than poll [`is_draining`](Self::is_draining).
    pub fn drain_token(&self) -> CancellationToken {
        self.draining.clone()
    }

    /// spec.md §4.8 step 1: reject if `Origin` is absent or not on the
    /// configured allow-list.
    pub fn is_origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(value) => self.allowed_origins.iter().any(|allowed| allowed == value),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.is_cancelled()
    }

    pub fn is_at_capacity(&self) -> bool {
        self.entries.len() >= self.max_connections
    }

    /// spec.md §4.8 steps 2-4, minus session initialization (the caller
    /// does that once registration succeeds, since it may fail and needs a
    /// registered-but-not-yet-ready window to be observable).
    pub fn register(&self, adventure_id: &str, token: &str) -> Result<Registration, RegisterError> {
        if self.is_draining() {
            return Err(RegisterError::Draining);
        }
        if self.is_at_capacity() {
            return Err(RegisterError::AtCapacity);
        }
        let key = (adventure_id.to_string(), token.to_string());
        if self.entries.contains_key(&key) {
            return Err(RegisterError::DuplicateBinding);
        }
        let (close_tx, close_rx) = watch::channel(None);
        self.entries.insert(
            key.clone(),
            Entry {
                last_ping_epoch_ms: AtomicI64::new(now_epoch_ms()),
                close_tx,
            },
        );
        Ok(Registration { key, close_rx })
    }

    pub fn unregister(&self, key: &(String, String)) {
        self.entries.remove(key);
    }

    pub fn touch_ping(&self, key: &(String, String)) {
        if let Some(entry) = self.entries.get(key) {
            entry.last_ping_epoch_ms.store(now_epoch_ms(), Ordering::SeqCst);
        }
    }

    /// One heartbeat pass: close and drop any connection whose last ping
    /// predates [`HEARTBEAT_TIMEOUT`]. Returns the keys it closed, mostly
    /// for tests.
    pub fn sweep_stale(&self) -> Vec<(String, String)> {
        let cutoff = now_epoch_ms() - HEARTBEAT_TIMEOUT.as_millis() as i64;
        let mut closed = Vec::new();
        self.entries.retain(|key, entry| {
            if entry.last_ping_epoch_ms.load(Ordering::SeqCst) < cutoff {
                let _ = entry.close_tx.send(Some((1000, "Heartbeat timeout".to_string())));
                closed.push(key.clone());
                false
            } else {
                true
            }
        });
        closed
    }

    /// Shutdown drain (spec.md §4.8): stop accepting new connections and
    /// push a close request to every live one. The caller still owns the
    /// ~100ms flush grace and process exit.
    pub fn start_draining(&self, code: u16, reason: &str) {
        self.draining.cancel();
        for entry in self.entries.iter() {
            let _ = entry.close_tx.send(Some((code, reason.to_string())));
        }
    }

    /// Spawn the periodic heartbeat task. Runs until the process exits;
    /// there is no explicit stop handle since the hub itself is process-wide.
    pub fn spawn_heartbeat(hub: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if hub.is_draining() {
                    break;
                }
                let closed = hub.sweep_stale();
                if !closed.is_empty() {
                    tracing::debug!(count = closed.len(), "closed stale connections on heartbeat sweep");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_check_rejects_missing_and_unlisted() {
        let hub = ConnectionHub::new(vec!["http://localhost:5173".to_string()], 10);
        assert!(!hub.is_origin_allowed(None));
        assert!(!hub.is_origin_allowed(Some("http://evil.example")));
        assert!(hub.is_origin_allowed(Some("http://localhost:5173")));
    }

    #[test]
    fn register_rejects_duplicate_binding() {
        let hub = ConnectionHub::new(vec![], 10);
        let first = hub.register("adv-1", "tok-1");
        assert!(first.is_ok());
        let second = hub.register("adv-1", "tok-1");
        assert_eq!(second.unwrap_err(), RegisterError::DuplicateBinding);
    }

    #[test]
    fn register_rejects_at_capacity() {
        let hub = ConnectionHub::new(vec![], 1);
        assert!(hub.register("adv-1", "tok-1").is_ok());
        let second = hub.register("adv-2", "tok-2");
        assert_eq!(second.unwrap_err(), RegisterError::AtCapacity);
    }

    #[test]
    fn unregister_frees_capacity_slot() {
        let hub = ConnectionHub::new(vec![], 1);
        let reg = hub.register("adv-1", "tok-1").unwrap();
        hub.unregister(&reg.key);
        assert!(hub.register("adv-2", "tok-2").is_ok());
    }

    #[test]
    fn sweep_stale_closes_connections_past_timeout() {
        let hub = ConnectionHub::new(vec![], 10);
        let reg = hub.register("adv-1", "tok-1").unwrap();
        if let Some(entry) = hub.entries.get(&reg.key) {
            entry.last_ping_epoch_ms.store(0, Ordering::SeqCst);
        }
        let closed = hub.sweep_stale();
        assert_eq!(closed, vec![reg.key]);
        assert_eq!(hub.len(), 0);
    }

    #[test]
    fn draining_rejects_new_registrations() {
        let hub = ConnectionHub::new(vec![], 10);
        hub.start_draining(1001, "Server shutting down");
        let result = hub.register("adv-1", "tok-1");
        assert_eq!(result.unwrap_err(), RegisterError::Draining);
    }
}
