//! Chat Relay - Entry Point
//!
//! Parses configuration, binds the listener and accepts connections.

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use chat_relay::{Config, RelayServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    // --log-level wins over RUST_LOG
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    let filter = match config.log_level.as_deref() {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = match RelayServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    server.run().await;
    Ok(())
}
