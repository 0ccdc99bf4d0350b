//! # Error Handling
//!
//! Centralized error types for Tailor core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Query failures are deliberately absent: the database layer reports them as
//! error rows (see [`crate::database::Row::error`]), never as `Err`.

use thiserror::Error;

/// Result type alias for Tailor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Tailor runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Router failed to match the requested path
    #[error("No route found for path: {path}")]
    RouteNotFound {
        /// The path that wasn't matched
        path: String,
    },

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database connection or setup error
    #[error("Database error: {message}")]
    Database {
        /// Error message from database
        message: String,
    },

    /// No driver registered under the configured key
    #[error("Unknown database driver: {name}")]
    UnknownDriver {
        /// The configuration key that was looked up
        name: String,
    },

    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// The OS random source failed
    #[error("Random source error: {message}")]
    Random {
        /// Error reported by the random source
        message: String,
    },

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}
