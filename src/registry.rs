//! The per-listener connection registry (§4.11, C11).
//!
//! Holds two maps under one mutex: `id → session` and a reverse
//! `session identity → id` used to resolve disconnects. Insert happens once
//! an accept handshake completes (or, for UDP, when a new sender endpoint is
//! observed); removal happens exactly once per session and is otherwise
//! idempotent. The registry never holds the callback-bundle mutex while
//! invoking callbacks — callers snapshot first.

use std::collections::HashMap;
use std::sync::Mutex;

/// A listener-side connection registry generic over the session type `S`.
///
/// `S` carries whatever an adapter needs to reach a session again (a sender
/// handle, a socket clone, ...) plus a `raw_identity` used for the reverse
/// lookup (e.g. a `SocketAddr` or a slab index).
pub struct ConnectionRegistry<S> {
    inner: Mutex<Inner<S>>,
}

struct Inner<S> {
    forward: HashMap<String, S>,
    reverse: HashMap<String, String>,
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        ConnectionRegistry {
            inner: Mutex::new(Inner {
                forward: HashMap::new(),
                reverse: HashMap::new(),
            }),
        }
    }
}

impl<S: Clone> ConnectionRegistry<S> {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session under `id`, keyed for reverse lookup by
    /// `raw_identity`. Overwrites any previous entry for the same id.
    pub fn insert(&self, id: String, raw_identity: String, session: S) {
        let mut inner = self.inner.lock().unwrap();
        inner.reverse.insert(raw_identity, id.clone());
        inner.forward.insert(id, session);
    }

    /// Remove a session by id. Idempotent: removing an absent id is a no-op.
    pub fn remove(&self, id: &str) -> Option<S> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner.forward.remove(id);
        inner.reverse.retain(|_, v| v != id);
        session
    }

    /// Remove a session by its raw identity, resolving to the id first.
    /// Idempotent.
    pub fn remove_by_identity(&self, raw_identity: &str) -> Option<(String, S)> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.reverse.remove(raw_identity)?;
        let session = inner.forward.remove(&id);
        session.map(|s| (id, s))
    }

    /// Look up a session by id.
    pub fn get(&self, id: &str) -> Option<S> {
        self.inner.lock().unwrap().forward.get(id).cloned()
    }

    /// Resolve a raw identity to its connection id.
    pub fn id_for_identity(&self, raw_identity: &str) -> Option<String> {
        self.inner.lock().unwrap().reverse.get(raw_identity).cloned()
    }

    /// Number of live sessions. Equal to both maps' sizes (invariant 5).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().forward.len()
    }

    /// Whether the registry holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of `(id, session)` pairs, taken under the lock, suitable
    /// for `broadcast` iteration without holding the lock during sends.
    pub fn snapshot(&self) -> Vec<(String, S)> {
        self.inner
            .lock()
            .unwrap()
            .forward
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether the forward and reverse maps are in bijection (invariant 5);
    /// exposed for tests.
    #[doc(hidden)]
    pub fn is_bijective(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.forward.len() == inner.reverse.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup() {
        let reg: ConnectionRegistry<u32> = ConnectionRegistry::new();
        reg.insert("conn-1".into(), "127.0.0.1:1".into(), 42);
        assert_eq!(reg.get("conn-1"), Some(42));
        assert_eq!(reg.len(), 1);
        assert!(reg.is_bijective());
    }

    #[test]
    fn remove_is_idempotent() {
        let reg: ConnectionRegistry<u32> = ConnectionRegistry::new();
        reg.insert("conn-1".into(), "127.0.0.1:1".into(), 42);
        assert_eq!(reg.remove("conn-1"), Some(42));
        assert_eq!(reg.remove("conn-1"), None);
        assert_eq!(reg.len(), 0);
        assert!(reg.is_bijective());
    }

    #[test]
    fn remove_by_identity_resolves_id() {
        let reg: ConnectionRegistry<u32> = ConnectionRegistry::new();
        reg.insert("conn-1".into(), "10.0.0.1:9".into(), 7);
        let (id, session) = reg.remove_by_identity("10.0.0.1:9").unwrap();
        assert_eq!(id, "conn-1");
        assert_eq!(session, 7);
        assert!(reg.is_empty());
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let reg: ConnectionRegistry<u32> = ConnectionRegistry::new();
        reg.insert("a".into(), "x".into(), 1);
        reg.insert("b".into(), "y".into(), 2);
        let mut snap = reg.snapshot();
        snap.sort();
        assert_eq!(
            snap,
            vec![("a".to_string(), 1), ("b".to_string(), 2)]
        );
    }
}
