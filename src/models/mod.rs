//! Data models for query-chain.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod user;

// Re-export commonly used types
pub use connection::{
    ConnectionConfig, ConnectionConfigError, DEFAULT_CONNECT_TIMEOUT_SECS, DatabaseType,
};
pub use query::{CallArgs, Output, QUERY_ARG, QueryParam, Record};
pub use user::{USERS_TABLE, User, numeric_value};
