//! # Configuration
//!
//! Application settings loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. A handful of environment variables override the file for
//! deployment:
//!
//! - `TAILOR_DATABASE_DRIVER`
//! - `TAILOR_DATABASE_URL`
//! - `TAILOR_SERVER_ADDRESS`

use crate::error::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// All application settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server
    pub server: ServerConfig,
    /// Database connection
    pub database: DatabaseConfig,
    /// Session cookie
    pub session: SessionConfig,
    /// Log output
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Parse TOML text
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the text is not valid TOML for this
    /// structure.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when the file cannot be read and `Error::Config`
    /// when it cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply `TAILOR_*` environment overrides
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when `TAILOR_SERVER_ADDRESS` is not a socket
    /// address.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(driver) = lookup("TAILOR_DATABASE_DRIVER") {
            self.database.driver = driver;
        }
        if let Some(url) = lookup("TAILOR_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(address) = lookup("TAILOR_SERVER_ADDRESS") {
            self.server.address = address.parse().map_err(|e| Error::Config {
                message: format!("TAILOR_SERVER_ADDRESS {address:?}: {e}"),
            })?;
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown in seconds
    pub shutdown_timeout_secs: u64,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl ServerConfig {
    /// Shutdown drain timeout
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout_secs: 30,
            max_body_size: 1024 * 1024,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Registry key of the driver (`sqlite`, `mysql`)
    pub driver: String,
    /// Connection URL
    pub url: String,
    /// Pool size
    pub max_connections: u32,
    /// Log every query at info level
    pub log_queries: bool,
    /// Abandon queries after this many milliseconds
    pub query_timeout_ms: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            url: "sqlite::memory:".to_string(),
            max_connections: 10,
            log_queries: false,
            query_timeout_ms: None,
        }
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the cookie holding the session id
    pub cookie_name: String,
    /// Seconds a session lives after the client's last request
    pub lifetime_secs: u64,
}

impl SessionConfig {
    /// Session lifetime
    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "_tailor_session".to_string(),
            lifetime_secs: 3600,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human readable text
    pub json: bool,
    /// Default filter directive, `RUST_LOG` takes precedence
    pub directive: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            directive: "tailor_core=info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.address.port(), 8000);
        assert!(config.server.keep_alive);
        assert_eq!(config.server.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.database.driver, "sqlite");
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.session.cookie_name, "_tailor_session");
        assert_eq!(config.session.lifetime(), Duration::from_secs(3600));
        assert!(!config.logging.json);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(AppConfig::from_toml_str("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [server]
            address = "0.0.0.0:3000"

            [database]
            driver = "mysql"
            url = "mysql://root@localhost/haberdashery"
            query_timeout_ms = 500
            log_queries = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.address.port(), 3000);
        assert_eq!(config.server.max_body_size, 1024 * 1024);
        assert_eq!(config.database.driver, "mysql");
        assert_eq!(config.database.query_timeout_ms, Some(500));
        assert!(config.database.log_queries);
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_session_section() {
        let config =
            AppConfig::from_toml_str("[session]\nlifetime_secs = 900\n").unwrap();
        assert_eq!(config.session.lifetime(), Duration::from_secs(900));
        assert_eq!(config.session.cookie_name, "_tailor_session");
    }

    #[test]
    fn test_invalid_toml() {
        let result = AppConfig::from_toml_str("[server]\naddress = 12");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(|name| match name {
                "TAILOR_DATABASE_URL" => Some("sqlite:hats.db".to_string()),
                "TAILOR_SERVER_ADDRESS" => Some("127.0.0.1:9000".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.database.url, "sqlite:hats.db");
        assert_eq!(config.database.driver, "sqlite");
        assert_eq!(config.server.address.port(), 9000);
    }

    #[test]
    fn test_bad_address_override() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "TAILOR_SERVER_ADDRESS").then(|| "nowhere".to_string())
        });
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let result = AppConfig::load("/definitely/not/here/tailor.toml");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
