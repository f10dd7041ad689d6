//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with
//! zero configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use duet_shared::constants::DEFAULT_HISTORY_LIMIT;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Explicit SQLite database path. When unset the platform data
    /// directory is used.
    /// Env: `DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Duet Messaging"`
    pub instance_name: String,

    /// Maximum number of messages a single history request may return.
    /// Env: `HISTORY_LIMIT`
    /// Default: 50
    pub history_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            db_path: None,
            instance_name: "Duet Messaging".to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Ok(val) = std::env::var("HISTORY_LIMIT") {
            if let Ok(n) = val.parse::<u32>() {
                config.history_limit = n;
            } else {
                tracing::warn!(value = %val, "Invalid HISTORY_LIMIT, using default");
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.history_limit, 50);
        assert!(config.db_path.is_none());
    }
}
