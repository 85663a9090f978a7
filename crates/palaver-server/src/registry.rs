//! Name-to-peer mapping; the single source of truth for who is online.

use std::collections::HashMap;

use crate::peer::PeerHandle;

/// Authoritative mapping from display name to peer handle.
///
/// At most one entry per name, and an entry implies a live handle. This is
/// a plain synchronous structure: the router wraps it in the one async
/// mutex that serializes every mutation, so nothing here locks.
#[derive(Debug, Default)]
pub struct Registry {
    peers: HashMap<String, PeerHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }

    /// Insert `(name, handle)` iff the name is free.
    ///
    /// On refusal the handle is handed back so the caller keeps ownership
    /// of the connection.
    pub fn register(&mut self, name: &str, mut handle: PeerHandle) -> Result<(), PeerHandle> {
        if self.peers.contains_key(name) {
            return Err(handle);
        }
        handle.bind_name(name);
        self.peers.insert(name.to_string(), handle);
        Ok(())
    }

    /// Remove and return the entry for `name`.
    ///
    /// Absent names are a no-op, which is what makes double teardown safe.
    pub fn unregister(&mut self, name: &str) -> Option<PeerHandle> {
        self.peers.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.peers.contains_key(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PeerHandle> {
        self.peers.get_mut(name)
    }

    /// Point-in-time copy of the registered names. The copy does not track
    /// later mutation of the registry.
    pub fn names(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_peer() -> PeerHandle {
        PeerHandle::new(Box::new(tokio::io::sink()))
    }

    #[test]
    fn test_register_unregister() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());

        assert!(registry.register("Alice", sink_peer()).is_ok());
        assert!(registry.contains("Alice"));
        assert_eq!(registry.len(), 1);

        let handle = registry.unregister("Alice").unwrap();
        assert_eq!(handle.name(), Some("Alice"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_name_refused() {
        let mut registry = Registry::new();
        assert!(registry.register("Alice", sink_peer()).is_ok());

        // The refused handle comes back unbound.
        let returned = registry.register("Alice", sink_peer()).unwrap_err();
        assert_eq!(returned.name(), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let mut registry = Registry::new();
        assert!(registry.unregister("Ghost").is_none());

        registry.register("Alice", sink_peer()).unwrap();
        assert!(registry.unregister("Alice").is_some());
        assert!(registry.unregister("Alice").is_none());
    }

    #[test]
    fn test_names_snapshot() {
        let mut registry = Registry::new();
        registry.register("Alice", sink_peer()).unwrap();
        registry.register("Bob", sink_peer()).unwrap();

        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["Alice".to_string(), "Bob".to_string()]);
    }
}
