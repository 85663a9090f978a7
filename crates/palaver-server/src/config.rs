//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the relay can start with zero
//! configuration for local development.

use std::net::SocketAddr;

use palaver_shared::constants::{DEFAULT_MAX_CLIENTS, DEFAULT_PORT};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the TCP listener binds.
    /// Env: `PALAVER_LISTEN_ADDR`
    /// Default: `127.0.0.1:12345`
    pub listen_addr: SocketAddr,

    /// Ceiling on concurrently connected clients. Connections past the
    /// ceiling are turned away before registration.
    /// Env: `PALAVER_MAX_CLIENTS`
    /// Default: `50`
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([127, 0, 0, 1], DEFAULT_PORT).into(),
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("PALAVER_LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.listen_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid PALAVER_LISTEN_ADDR, using default"
                );
            }
        }

        if let Ok(val) = std::env::var("PALAVER_MAX_CLIENTS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_clients = n,
                _ => {
                    tracing::warn!(
                        value = %val,
                        "Invalid PALAVER_MAX_CLIENTS, using default"
                    );
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
