//! Relay configuration
//!
//! Parsed from the command line with clap; every flag has a default so a
//! bare `chat_relay` listens on `0.0.0.0:8081`.

use clap::Parser;

use crate::codec::DEFAULT_MAX_LINE_LENGTH;
use crate::protocol::DEFAULT_OBSERVER_PREFIX;

/// Default listen address
pub const DEFAULT_ADDR: &str = "0.0.0.0:8081";

/// Default per-connection outbound queue depth
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Command-line arguments
#[derive(Debug, Clone, Parser)]
#[command(name = "chat_relay", about = "Line-protocol TCP chat relay")]
pub struct Config {
    /// Address to listen on (same as --addr).
    #[arg(value_name = "ADDR", conflicts_with = "addr")]
    pub listen: Option<String>,

    /// Address to listen on, host:port.
    #[arg(long)]
    pub addr: Option<String>,

    /// Nickname prefix reserved for internal observer connections.
    #[arg(long, default_value = DEFAULT_OBSERVER_PREFIX)]
    pub observer_prefix: String,

    /// Longest accepted input line in bytes; longer lines are dropped.
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,

    /// Lines buffered per connection before further lines to it are dropped.
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_capacity: usize,

    /// Log filter (error, warn, info, debug, trace); overrides RUST_LOG.
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Config {
    /// The address the listener binds
    pub fn bind_addr(&self) -> &str {
        self.addr
            .as_deref()
            .or(self.listen.as_deref())
            .unwrap_or(DEFAULT_ADDR)
    }

    /// Outbound queue depth, never zero
    pub fn outbound_capacity(&self) -> usize {
        self.outbound_capacity.max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: None,
            addr: None,
            observer_prefix: DEFAULT_OBSERVER_PREFIX.to_string(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            log_level: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["chat_relay"]).unwrap();
        assert_eq!(config.bind_addr(), DEFAULT_ADDR);
        assert_eq!(config.observer_prefix, "__LAUNCHER__");
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
        assert_eq!(config.outbound_capacity(), DEFAULT_OUTBOUND_CAPACITY);
    }

    #[test]
    fn test_positional_and_flag_addr() {
        let config = Config::try_parse_from(["chat_relay", "127.0.0.1:9000"]).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");

        let config = Config::try_parse_from(["chat_relay", "--addr", "[::1]:7000"]).unwrap();
        assert_eq!(config.bind_addr(), "[::1]:7000");

        assert!(Config::try_parse_from(["chat_relay", "a:1", "--addr", "b:2"]).is_err());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let config =
            Config::try_parse_from(["chat_relay", "--outbound-capacity", "0"]).unwrap();
        assert_eq!(config.outbound_capacity(), 1);
    }
}
