//! # Tailor Core
//!
//! Core runtime library for the Tailor web framework.
//! Provides the request filter pipeline that wraps every route handler and
//! the database layer that marshals typed values to and from SQLite and MySQL.
//!
//! ## Architecture
//!
//! A request enters the [`server::Server`], is matched by the [`router`],
//! and runs through the route's [`filter::FilterChain`]. Handlers talk to a
//! [`database::DatabaseDriver`] chosen at startup from the
//! [`database::DriverRegistry`]. Query failures come back as error rows,
//! filter denials as ordinary responses.
//!
//! ## Modules
//!
//! - `server` - HTTP server built on Hyper
//! - `router` - Routing using matchit (radix trie)
//! - `request` / `response` - HTTP values handed through the filters
//! - `filter` - Filter pipeline plus CSRF, ETag and authentication filters
//! - `session` - Session data and storage
//! - `database` - Driver contract, SQLite and MySQL drivers, driver registry
//! - `value` - Typed database values
//! - `time` - Time zones and database time formats
//! - `config` - TOML configuration
//! - `logging` - Tracing setup
//! - `json` - JSON parsing with simd-json
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod json;
pub mod logging;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod session;
pub mod time;
pub mod value;

pub use config::AppConfig;
pub use database::{DatabaseDriver, DriverRegistry, Row};
pub use error::{Error, Result};
pub use filter::{
    AuthenticationFilter, CsrfFilter, EtagFilter, FilterChain, FilterResult, RequestFilter,
};
pub use json::{parse_json, to_json};
pub use request::Request;
pub use response::Response;
pub use router::{Method, Router};
pub use server::{handler, Handler, Server};
pub use session::{MemorySessionStore, Session, SessionStore};
pub use value::Value;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
