//! Gateway configuration
//!
//! Loaded from environment variables with the `EXCHANGE_` prefix, with an
//! optional file source. The core consumes only the state-store and
//! event-bus coordinates; everything else tunes the adapter.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP/WebSocket listen address.
    pub listen_addr: SocketAddr,
    /// Trading symbols in BASE/QUOTE form.
    pub symbols: Vec<String>,
    /// Journal directory for the durable store.
    pub data_dir: PathBuf,
    /// Run on the journaled store; false keeps everything in memory.
    pub durable: bool,
    /// Depth of the initial snapshot sent to a new session.
    pub snapshot_depth: usize,
    /// Per-symbol event bus capacity.
    pub bus_capacity: usize,
    /// Allowed CORS origins; empty means permissive.
    pub cors_origins: Vec<String>,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".parse().expect("static addr"),
            symbols: vec!["BTC/USD".to_string(), "ETH/USD".to_string()],
            data_dir: PathBuf::from("data/journal"),
            durable: true,
            snapshot_depth: 20,
            bus_capacity: 1024,
            cors_origins: Vec::new(),
            debug: false,
        }
    }
}

impl Settings {
    fn env_source() -> config::Environment {
        config::Environment::with_prefix("EXCHANGE")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("symbols")
            .with_list_parse_key("cors_origins")
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(Self::env_source())
            .build()?;
        cfg.try_deserialize()
    }

    /// Load configuration from a file, with the environment on top.
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(Self::env_source())
            .build()?;
        cfg.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.listen_addr.port(), 8080);
        assert!(settings.durable);
        assert_eq!(settings.snapshot_depth, 20);
        assert!(settings.cors_origins.is_empty());
    }

    #[test]
    fn test_deserialize_partial_overrides() {
        let settings: Settings = serde_json::from_str(
            r#"{"listen_addr":"127.0.0.1:9000","symbols":["SOL/USD"],"debug":true}"#,
        )
        .unwrap();
        assert_eq!(settings.listen_addr.port(), 9000);
        assert_eq!(settings.symbols, vec!["SOL/USD"]);
        assert!(settings.debug);
        // Untouched fields keep their defaults.
        assert_eq!(settings.bus_capacity, 1024);
    }
}
