//! Line-protocol TCP Chat Relay Library
//!
//! A multi-client chat relay built on tokio. Clients register a nickname,
//! then exchange messages to everyone or to one named peer, with live
//! renames and avatar announcements.
//!
//! # Features
//! - Nickname handshake with uniqueness and reserved-name checks
//! - Broadcast and directed chat messages
//! - Live rename (`CMD:NAME_CHANGE:`) and avatar (`CMD:AVATAR:`) updates
//! - Online user list pushed on every join, rename and leave
//! - Observer connections that receive updates without being listed
//!
//! # Architecture
//! - `Registry` is the single shared map (nickname → `Peer`), guarded by
//!   one mutex
//! - Each connection has a session task reading lines and a writer task
//!   draining its outbound queue
//! - `Broadcaster` snapshots the registry, releases the lock, then queues
//!   lines without waiting on any peer
//!
//! # Example
//! ```ignore
//! use chat_relay::{Config, RelayServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = RelayServer::bind(Config::default()).await.unwrap();
//!     server.run().await;
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use broadcast::Broadcaster;
pub use client::Peer;
pub use codec::LineCodec;
pub use config::Config;
pub use error::{RegistryError, RelayError, SendError};
pub use protocol::{ClientLine, ErrorCode, ServerLine, Target};
pub use registry::{Registry, Roster};
pub use server::{RelayServer, RelayState};
pub use session::{handle_connection, Phase, Session};
pub use types::{ConnectionId, MessageId};
