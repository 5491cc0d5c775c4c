//! Dialect dispatch macro.
//!
//! [`DbConnection`](crate::db::DbConnection) wraps one sqlx connection per
//! dialect. Most operations are textually identical across dialects, only the
//! bound query type differs; this macro writes the match for them.

/// Expand `$body` once per [`DbConnection`](crate::db::DbConnection) variant,
/// binding the inner sqlx connection to `$conn` and the dialect's
/// query builder function to `$query`.
///
/// # Example
///
/// ```ignore
/// with_dialect!(self, |conn, query| {
///     query(sql, params).execute(&mut *conn).await?.rows_affected()
/// })
/// ```
#[macro_export]
macro_rules! with_dialect {
    ($target:expr, |$conn:ident, $query:ident| $body:expr) => {
        match $target {
            $crate::db::DbConnection::MySql($conn) => {
                let $query = $crate::db::params::mysql_query;
                $body
            }
            $crate::db::DbConnection::SQLite($conn) => {
                let $query = $crate::db::params::sqlite_query;
                $body
            }
        }
    };
}

pub use with_dialect;
