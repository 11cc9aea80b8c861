//! Listener and shared relay state
//!
//! `RelayServer` owns the bound listener and spawns one session task per
//! accepted connection. The only state sessions share is `RelayState`:
//! the registry, the broadcaster built on it, and the configuration.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, Instrument};

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::error::RelayError;
use crate::registry::Registry;
use crate::session::handle_connection;
use crate::types::ConnectionId;

/// State shared by every session
#[derive(Debug, Clone)]
pub struct RelayState {
    pub registry: Registry,
    pub broadcaster: Broadcaster,
    pub config: Arc<Config>,
}

impl RelayState {
    pub fn new(config: Config) -> Self {
        let registry = Registry::new(&config.observer_prefix);
        Self {
            broadcaster: Broadcaster::new(registry.clone()),
            registry,
            config: Arc::new(config),
        }
    }
}

/// The relay's TCP listener
pub struct RelayServer {
    listener: TcpListener,
    state: RelayState,
}

impl RelayServer {
    /// Bind the configured address
    ///
    /// A failure here is the one error that should stop the process.
    pub async fn bind(config: Config) -> Result<Self, RelayError> {
        let addr = config.bind_addr().to_string();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        Ok(Self::from_listener(listener, config))
    }

    /// Wrap an already bound listener
    pub fn from_listener(listener: TcpListener, config: Config) -> Self {
        Self {
            listener,
            state: RelayState::new(config),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    /// Accept connections forever
    ///
    /// Accept errors are logged and the loop keeps going.
    pub async fn run(self) {
        if let Ok(addr) = self.local_addr() {
            info!("Chat relay listening on {}", addr);
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    info!("New connection from {}", peer_addr);
                    let state = self.state.clone();
                    let conn_id = ConnectionId::new();
                    let span = info_span!("session", conn = %conn_id, peer = %peer_addr);

                    tokio::spawn(
                        async move {
                            if let Err(e) = handle_connection(stream, conn_id, state).await {
                                debug!("Connection ended with error: {}", e);
                            }
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
