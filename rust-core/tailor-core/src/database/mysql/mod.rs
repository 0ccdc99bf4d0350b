//! # MySQL Driver
//!
//! Prepared statements over an sqlx MySQL pool, with every input and output
//! passing through an owned bind buffer.
//!
//! - `field` - column metadata and the authoritative type to buffer size table
//! - `bind` - owned input/output buffers and their conversion to `Value`
//! - `connection` - the pool-backed driver and its statement

pub mod bind;
pub mod connection;
pub mod field;

pub use bind::{MysqlBindParameter, MysqlBindParameterSet, NativeTime};
pub use connection::{MysqlConnection, MysqlStatement};
pub use field::{FieldType, MysqlField};
