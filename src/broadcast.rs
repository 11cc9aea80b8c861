//! Line delivery
//!
//! All sends are best-effort: a full or closed peer queue is logged,
//! never retried, and never stops delivery to anyone else. Either failure
//! marks the peer broken, which makes its session disconnect it.
//! Fan-out works on a registry snapshot so the registry lock is already
//! released by the time the first line is queued.

use tracing::{debug, warn};

use crate::client::Peer;
use crate::error::SendError;
use crate::protocol::ServerLine;
use crate::registry::Registry;

/// Fans server lines out to registered peers
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Registry,
}

impl Broadcaster {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Queue one line for one peer; returns whether it was queued
    pub fn send(&self, peer: &Peer, line: &ServerLine) -> bool {
        deliver(peer, &line.to_string())
    }

    /// Same contract as `send`, used for chat lines aimed at one nickname
    pub fn send_directed(&self, peer: &Peer, line: &ServerLine) -> bool {
        self.send(peer, line)
    }

    /// Queue `line` for every registered peer, in registration order
    ///
    /// Returns how many peers accepted it.
    pub async fn broadcast_all(&self, line: &ServerLine) -> usize {
        let snapshot = self.registry.snapshot().await;
        let rendered = line.to_string();
        snapshot
            .iter()
            .filter(|(_, peer)| deliver(peer, &rendered))
            .count()
    }

    /// Send the current `USERS` list to everyone (observers included)
    pub async fn broadcast_user_list(&self) -> usize {
        let roster = self.registry.roster().await;
        let rendered = ServerLine::Users {
            names: roster.names,
        }
        .to_string();
        roster.peers.iter().filter(|peer| deliver(peer, &rendered)).count()
    }
}

fn deliver(peer: &Peer, line: &str) -> bool {
    // Once a line has been lost the peer is on its way out; queuing more
    // would leave a gap in what it sees.
    if peer.is_broken() {
        return false;
    }
    match peer.send(line) {
        Ok(()) => true,
        Err(SendError::QueueFull) => {
            warn!("Outbound queue full for {}, disconnecting it", peer.id);
            false
        }
        Err(SendError::Closed) => {
            debug!("Skipping closed connection {}", peer.id);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_OBSERVER_PREFIX;
    use crate::types::ConnectionId;
    use tokio::sync::mpsc;

    fn peer(capacity: usize) -> (Peer, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Peer::new(ConnectionId::new(), tx), rx)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let registry = Registry::new(DEFAULT_OBSERVER_PREFIX);
        let broadcaster = Broadcaster::new(registry.clone());
        let (alice, mut alice_rx) = peer(8);
        let (bob, mut bob_rx) = peer(8);
        registry.register("Alice", alice).await.unwrap();
        registry.register("Bob", bob).await.unwrap();

        let line = ServerLine::Msg {
            sender: "Alice".to_string(),
            target: "ALL".to_string(),
            id: "1001".to_string(),
            content: "hi".to_string(),
        };
        assert_eq!(broadcaster.broadcast_all(&line).await, 2);
        assert_eq!(alice_rx.recv().await.as_deref(), Some("MSG|Alice|ALL|1001|hi"));
        assert_eq!(bob_rx.recv().await.as_deref(), Some("MSG|Alice|ALL|1001|hi"));
    }

    #[tokio::test]
    async fn test_broken_peer_does_not_stop_fanout() {
        let registry = Registry::new(DEFAULT_OBSERVER_PREFIX);
        let broadcaster = Broadcaster::new(registry.clone());
        let (gone, gone_rx) = peer(8);
        let (slow, mut slow_rx) = peer(1);
        let (bob, mut bob_rx) = peer(8);
        drop(gone_rx);
        slow.send("backlog").unwrap();
        registry.register("Gone", gone.clone()).await.unwrap();
        registry.register("Slow", slow.clone()).await.unwrap();
        registry.register("Bob", bob).await.unwrap();

        let delivered = broadcaster.broadcast_all(&ServerLine::joined("Bob")).await;
        assert_eq!(delivered, 1);
        assert!(bob_rx.recv().await.unwrap().ends_with("|Bob -> has joined the chat"));
        assert!(gone.is_broken());
        assert!(slow.is_broken());

        // A broken peer gets nothing further, even once its queue has room
        assert_eq!(slow_rx.recv().await.as_deref(), Some("backlog"));
        assert_eq!(broadcaster.broadcast_all(&ServerLine::joined("Carol")).await, 1);
        assert!(slow_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_user_list_hides_observers() {
        let registry = Registry::new(DEFAULT_OBSERVER_PREFIX);
        let broadcaster = Broadcaster::new(registry.clone());
        let (alice, mut alice_rx) = peer(8);
        let (observer, mut observer_rx) = peer(8);
        registry.register("Alice", alice).await.unwrap();
        registry.register("__LAUNCHER__ffffff", observer).await.unwrap();

        assert_eq!(broadcaster.broadcast_user_list().await, 2);
        assert_eq!(alice_rx.recv().await.as_deref(), Some("USERS|System|ALL|Alice"));
        assert_eq!(observer_rx.recv().await.as_deref(), Some("USERS|System|ALL|Alice"));
    }
}
