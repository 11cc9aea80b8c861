//! User registry
//!
//! The one piece of shared mutable state in the relay: nickname → peer.
//! Every operation takes the same mutex, so register/remove/rename are
//! atomic with respect to each other. Readers get owned snapshots and do
//! their sending after the lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::client::Peer;
use crate::error::RegistryError;
use crate::protocol::is_observer;

/// Shared nickname → peer mapping
///
/// Cheap to clone; all clones see the same state.
#[derive(Debug, Clone)]
pub struct Registry {
    inner: Arc<Mutex<RegistryState>>,
    observer_prefix: Arc<str>,
}

#[derive(Debug, Default)]
struct RegistryState {
    users: HashMap<String, Entry>,
    /// Registration order; a rename counts as a fresh registration.
    next_seq: u64,
}

#[derive(Debug)]
struct Entry {
    peer: Peer,
    seq: u64,
}

impl RegistryState {
    fn insert(&mut self, name: String, peer: Peer) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.users.insert(name, Entry { peer, seq });
    }

    fn ordered(&self) -> Vec<(&String, &Entry)> {
        let mut entries: Vec<_> = self.users.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.seq);
        entries
    }
}

/// Point-in-time view used for a `USERS` broadcast
///
/// `names` is what end users get to see (observers filtered out);
/// `peers` is who receives the line (observers included).
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub names: Vec<String>,
    pub peers: Vec<Peer>,
}

impl Registry {
    /// Create an empty registry that hides names starting with `observer_prefix`
    pub fn new(observer_prefix: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryState::default())),
            observer_prefix: Arc::from(observer_prefix),
        }
    }

    /// Claim `name` for `peer`
    pub async fn register(&self, name: &str, peer: Peer) -> Result<(), RegistryError> {
        let mut state = self.inner.lock().await;
        if state.users.contains_key(name) {
            return Err(RegistryError::NameTaken(name.to_string()));
        }
        state.insert(name.to_string(), peer);
        debug!("Registered '{}' ({} online)", name, state.users.len());
        Ok(())
    }

    /// Release `name`. Returns true if an entry was actually removed.
    pub async fn remove(&self, name: &str) -> bool {
        let mut state = self.inner.lock().await;
        let removed = state.users.remove(name).is_some();
        if removed {
            debug!("Removed '{}' ({} online)", name, state.users.len());
        }
        removed
    }

    /// Move the entry under `old` to `new` in one step
    ///
    /// On conflict nothing changes and `old` stays registered.
    pub async fn rename(&self, old: &str, new: &str) -> Result<(), RegistryError> {
        let mut state = self.inner.lock().await;
        if state.users.contains_key(new) {
            return Err(RegistryError::NameTaken(new.to_string()));
        }
        let Some(entry) = state.users.remove(old) else {
            return Err(RegistryError::NotRegistered(old.to_string()));
        };
        state.insert(new.to_string(), entry.peer);
        debug!("Renamed '{}' -> '{}'", old, new);
        Ok(())
    }

    /// Exact-case lookup
    pub async fn lookup(&self, name: &str) -> Option<Peer> {
        let state = self.inner.lock().await;
        state.users.get(name).map(|entry| entry.peer.clone())
    }

    /// Every entry in registration order, observers included
    pub async fn snapshot(&self) -> Vec<(String, Peer)> {
        let state = self.inner.lock().await;
        state
            .ordered()
            .into_iter()
            .map(|(name, entry)| (name.clone(), entry.peer.clone()))
            .collect()
    }

    /// Visible names and all recipients, taken under one lock
    pub async fn roster(&self) -> Roster {
        let state = self.inner.lock().await;
        let mut roster = Roster::default();
        for (name, entry) in state.ordered() {
            if !is_observer(name, &self.observer_prefix) {
                roster.names.push(name.clone());
            }
            roster.peers.push(entry.peer.clone());
        }
        roster
    }

    /// Number of registered nicknames, observers included
    pub async fn len(&self) -> usize {
        self.inner.lock().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_OBSERVER_PREFIX;
    use crate::types::ConnectionId;
    use tokio::sync::mpsc;

    fn peer() -> Peer {
        let (tx, _rx) = mpsc::channel(8);
        Peer::new(ConnectionId::new(), tx)
    }

    #[tokio::test]
    async fn test_register_conflict() {
        let registry = Registry::new(DEFAULT_OBSERVER_PREFIX);
        registry.register("Alice", peer()).await.unwrap();

        assert_eq!(
            registry.register("Alice", peer()).await,
            Err(RegistryError::NameTaken("Alice".to_string()))
        );
        // Exact-case: a differently cased name is a different user
        registry.register("alice", peer()).await.unwrap();
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove_reports_absence() {
        let registry = Registry::new(DEFAULT_OBSERVER_PREFIX);
        registry.register("Alice", peer()).await.unwrap();

        assert!(registry.remove("Alice").await);
        assert!(!registry.remove("Alice").await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_rename_moves_entry() {
        let registry = Registry::new(DEFAULT_OBSERVER_PREFIX);
        let alice = peer();
        let alice_id = alice.id;
        registry.register("Alice", alice).await.unwrap();

        registry.rename("Alice", "Al").await.unwrap();
        assert!(registry.lookup("Alice").await.is_none());
        assert_eq!(registry.lookup("Al").await.map(|p| p.id), Some(alice_id));
    }

    #[tokio::test]
    async fn test_rename_conflict_keeps_old() {
        let registry = Registry::new(DEFAULT_OBSERVER_PREFIX);
        registry.register("Alice", peer()).await.unwrap();
        registry.register("Bob", peer()).await.unwrap();

        assert_eq!(
            registry.rename("Alice", "Bob").await,
            Err(RegistryError::NameTaken("Bob".to_string()))
        );
        assert!(registry.lookup("Alice").await.is_some());
        assert_eq!(
            registry.rename("Ghost", "Casper").await,
            Err(RegistryError::NotRegistered("Ghost".to_string()))
        );
    }

    #[tokio::test]
    async fn test_snapshot_order_and_roster() {
        let registry = Registry::new(DEFAULT_OBSERVER_PREFIX);
        registry.register("Alice", peer()).await.unwrap();
        registry.register("__LAUNCHER__a1b2c3", peer()).await.unwrap();
        registry.register("Bob", peer()).await.unwrap();
        registry.rename("Alice", "Al").await.unwrap();

        let names: Vec<_> = registry.snapshot().await.into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["__LAUNCHER__a1b2c3", "Bob", "Al"]);

        let roster = registry.roster().await;
        assert_eq!(roster.names, vec!["Bob", "Al"]);
        assert_eq!(roster.peers.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rename_single_winner() {
        let registry = Registry::new(DEFAULT_OBSERVER_PREFIX);
        for i in 0..16 {
            registry.register(&format!("user{i}"), peer()).await.unwrap();
        }

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.rename(&format!("user{i}"), "winner").await })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(registry.len().await, 16);
        assert!(registry.lookup("winner").await.is_some());
    }
}
