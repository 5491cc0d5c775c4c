//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection and connector traits the wrapper chain is written against
//! - sqlx-backed connections for MySQL and SQLite
//! - Parameter binding and row decoding
//! - A dispatch macro for dialect-parallel code

pub mod connection;
#[macro_use]
pub mod macros;
pub mod params;
pub mod types;

pub use connection::{Connection, Connector, DbConnection, SqlxConnector};
pub use types::{IntoRecord, RawDecimal};
