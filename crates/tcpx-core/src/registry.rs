use crate::connection::{ConnId, Connection};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

struct RegistryState {
    connections: HashMap<ConnId, Arc<Connection>>,
    sealed: bool,
}

/// Thread-safe set of live connections.
///
/// Mutated concurrently by the accept loop (add) and every reactor shard
/// (remove on disconnect). `clear_all` seals the registry: once the server is
/// shutting down nothing new can be admitted.
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                connections: HashMap::new(),
                sealed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // No operation leaves the map half-updated, so poisoning is ignored.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts `conn` and returns the total count observed atomically with the insert.
    ///
    /// Returns `None` when nothing was inserted: the connection was already
    /// closed, or the registry was sealed by `clear_all` (the connection is then
    /// closed on the spot).
    pub fn add(&self, conn: Arc<Connection>) -> Option<usize> {
        let mut state = self.lock();
        if state.sealed {
            drop(state);
            conn.close();
            return None;
        }
        // The shard closes before it removes, so checking under the lock
        // guarantees a racing disconnect cannot leave a stale entry behind.
        if conn.is_closed() {
            return None;
        }
        state.connections.insert(conn.id(), conn);
        Some(state.connections.len())
    }

    pub fn remove(&self, id: ConnId) -> Option<Arc<Connection>> {
        self.lock().connections.remove(&id)
    }

    pub fn get(&self, id: ConnId) -> Option<Arc<Connection>> {
        self.lock().connections.get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn ids(&self) -> Vec<ConnId> {
        self.lock().connections.keys().copied().collect()
    }

    /// Closes and removes every connection, then seals the registry.
    /// Returns how many connections were closed.
    pub fn clear_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut state = self.lock();
            state.sealed = true;
            state.connections.drain().map(|(_, conn)| conn).collect()
        };
        drained.iter().filter(|conn| conn.close()).count()
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ConnectionRegistry")
            .field("active", &state.connections.len())
            .field("sealed", &state.sealed)
            .finish()
    }
}
