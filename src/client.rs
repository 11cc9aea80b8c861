//! Peer handle definition
//!
//! The registry-visible side of a connection: its id, the sending half of
//! its outbound line queue, and a token that trips once the connection can
//! no longer be written to. The session owns the socket; everyone else
//! only ever holds a `Peer`.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::types::ConnectionId;

/// Cloneable handle to one connection's outbound queue
#[derive(Debug, Clone)]
pub struct Peer {
    /// Connection this handle writes to
    pub id: ConnectionId,
    /// Server → Client line queue, drained by the connection's writer task
    sender: mpsc::Sender<String>,
    /// Shared by all clones; cancelled on the first failed delivery
    broken: CancellationToken,
}

impl Peer {
    /// Create a peer with the given ID and queue sender
    pub fn new(id: ConnectionId, sender: mpsc::Sender<String>) -> Self {
        Self {
            id,
            sender,
            broken: CancellationToken::new(),
        }
    }

    /// Queue one line for this peer without waiting
    ///
    /// A full queue or a closed writer is a transport failure: the peer is
    /// marked broken and its session disconnects it.
    pub fn send(&self, line: impl Into<String>) -> Result<(), SendError> {
        let result = self.sender.try_send(line.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        });
        if result.is_err() {
            self.mark_broken();
        }
        result
    }

    /// Flag the connection as unwritable
    pub fn mark_broken(&self) {
        self.broken.cancel();
    }

    /// Token the connection's writer watches and trips on write failure
    pub fn broken_token(&self) -> CancellationToken {
        self.broken.clone()
    }

    pub fn is_broken(&self) -> bool {
        self.broken.is_cancelled()
    }

    /// Resolves once the connection has been marked broken
    pub async fn broken(&self) {
        self.broken.cancelled().await
    }
}
