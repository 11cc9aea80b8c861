//! Basic type definitions for the chat relay
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: UUID-based identifier for one accepted connection
//! - `MessageId`: server-authored message id (`<unix-millis>-<6 hex>`)

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4. Nicknames change over a session's lifetime, so logs
/// and registry entries use this to tell connections apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message id for system-authored messages
///
/// Millisecond wall-clock time plus a short random suffix. Unique in
/// practice without any shared counter; not meant to be unguessable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a fresh id
    pub fn generate() -> Self {
        use rand::Rng;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
        Self(format!("{}-{:06x}", millis, suffix))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_message_id_shape() {
        let id = MessageId::generate();
        let (millis, suffix) = id.0.split_once('-').unwrap();
        assert!(millis.parse::<u128>().unwrap() > 0);
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_message_id_varies() {
        let ids: std::collections::HashSet<_> = (0..64).map(|_| MessageId::generate()).collect();
        assert!(ids.len() > 1);
    }
}
