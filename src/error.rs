//! Error types for the chat relay
//!
//! Defines fatal relay errors, best-effort send errors and registry conflicts.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Relay-level errors
///
/// Only `Bind` is fatal for the process. Everything else ends the
/// affected connection and nothing more.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listener could not bind its address (fatal)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error on a single connection
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Outbound lines could not be delivered (queue overflow or write failure)
    #[error("connection can no longer be written to")]
    Unwritable,
}

/// Outbound queue errors
///
/// Returned by `Peer::send`. The broadcaster logs and swallows both.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The peer is not draining its queue fast enough
    #[error("outbound queue full")]
    QueueFull,

    /// The receiving end of the queue has been closed
    #[error("connection closed")]
    Closed,
}

/// Registry mutation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The requested nickname is already registered
    #[error("nickname '{0}' is already taken")]
    NameTaken(String),

    /// The nickname to act on is not registered
    #[error("nickname '{0}' is not registered")]
    NotRegistered(String),
}
