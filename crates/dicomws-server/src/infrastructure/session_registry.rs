//! Registry of live WebSocket connections.
//!
//! Each connection task registers itself after the WebSocket handshake and
//! is removed when the task ends, however it ends: the [`SessionGuard`]
//! returned by [`SessionRegistry::enter`] unregisters on drop, so a panic or
//! an aborted task cannot leave a stale entry behind.
//!
//! The registry is owned by whoever starts the listener and shared with it as
//! an `Arc`; there is no process-wide instance.  Tasks on the listener thread
//! write to it while other threads (tests, the binary) read snapshots, so the
//! map sits behind a `std::sync::RwLock`.  No lock is ever held across an
//! `.await`.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

/// Opaque identity of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first block of the UUID is plenty to tell sessions apart in logs.
        let text = self.0.to_string();
        f.write_str(text.split('-').next().unwrap_or(&text))
    }
}

/// One live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSession {
    pub id: SessionId,
    pub peer: SocketAddr,
}

/// The set of currently open connections.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SocketAddr>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection and returns its new identity.
    pub fn register(&self, peer: SocketAddr) -> SessionId {
        let id = SessionId::new();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, peer);
        id
    }

    /// Removes a connection.  Returns `false` if it was not registered.
    pub fn unregister(&self, id: SessionId) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Registers `peer` and returns a guard that unregisters it when dropped.
    pub fn enter(self: &Arc<Self>, peer: SocketAddr) -> SessionGuard {
        let id = self.register(peer);
        SessionGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    /// A point-in-time copy of the open connections.
    ///
    /// Later registrations and removals do not affect the returned list.
    pub fn active_connections(&self) -> Vec<ActiveSession> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(&id, &peer)| ActiveSession { id, peer })
            .collect()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps one connection registered for as long as it lives.
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
