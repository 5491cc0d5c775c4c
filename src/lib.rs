//! query-chain Library
//!
//! Runs data-access operations against SQLite or MySQL through an ordered
//! chain of wrappers: connection scope, query logging, retry, transactions
//! and a query result cache. Also provides lazy row streams that own and
//! release their own connection.

pub mod chain;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod stream;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

pub use chain::{Layer, Next, Operation, Pipeline, QueryCache, Retry, Scoped};
pub use config::Config;
pub use context::AppContext;
pub use error::{DbError, DbResult};
pub use stream::RowStream;
