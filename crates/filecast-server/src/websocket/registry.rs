//! The set of currently connected clients.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

use super::connection::{ClientConnection, ConnectionId};

/// Authoritative membership of connected clients.
///
/// A handle is present from the moment its reader registers it until the
/// first failed read or write removes it. All three operations go through one
/// lock. [`snapshot`](Self::snapshot) copies the handles out so callers can
/// write to clients without holding it.
pub struct ConnectionRegistry {
    connections: RwLock<BTreeMap<ConnectionId, Arc<ClientConnection>>>,
    /// Mirror of `connections.len()` readable without the lock.
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(BTreeMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Register a connection.
    ///
    /// Returns `false` and leaves the registry untouched if a handle with the
    /// same id is already present.
    pub async fn add(&self, connection: Arc<ClientConnection>) -> bool {
        let mut conns = self.connections.write().await;
        if conns.contains_key(&connection.id) {
            debug!(client_id = %connection.id, "connection already registered");
            return false;
        }
        let _ = conns.insert(connection.id, connection);
        let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Remove a connection by id.
    ///
    /// Returns `true` only for the call that actually removed it; removing an
    /// absent id is a no-op.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let mut conns = self.connections.write().await;
        if conns.remove(&id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Point-in-time copy of every registered handle, in connection order.
    pub async fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Whether `id` is currently registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
