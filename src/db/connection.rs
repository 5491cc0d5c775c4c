//! Connection and connector abstractions.
//!
//! [`Connection`] is the set of primitives every wrapper in a chain relies on
//! (fetch, execute, begin/commit/rollback, close). [`Connector`] opens them.
//! The sqlx-backed implementations live here as well; tests plug in their
//! own implementations to observe the lifecycle.

use crate::db::types::IntoRecord;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType, QueryParam, Record};
use crate::with_dialect;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::Connection as _;
use sqlx::Executor as _;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};

/// An open handle to a relational store.
///
/// A connection is exclusively owned; `close` consumes it so a closed
/// connection can never be used again.
#[async_trait]
pub trait Connection: Send + Sized + 'static {
    /// Run a query and collect every row.
    async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Record>>;

    /// Run a query and return its first row, if any.
    async fn fetch_optional(&mut self, sql: &str, params: &[QueryParam])
    -> DbResult<Option<Record>>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64>;

    /// Run a query and push rows into `sink` one at a time as they are read.
    ///
    /// Stops early without error when the receiving side has gone away.
    async fn stream_into(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        sink: &mpsc::Sender<DbResult<Record>>,
    ) -> DbResult<()>;

    async fn begin(&mut self) -> DbResult<()>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;

    /// Release the connection.
    async fn close(self) -> DbResult<()>;
}

/// Opens connections on demand.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;

    async fn connect(&self) -> DbResult<Self::Conn>;
}

/// A single sqlx connection for one of the supported dialects.
#[derive(Debug)]
pub enum DbConnection {
    MySql(MySqlConnection),
    SQLite(SqliteConnection),
}

impl DbConnection {
    /// Run a parameterless control statement over the text protocol.
    async fn control(&mut self, statement: &'static str) -> DbResult<()> {
        with_dialect!(self, |conn, _query| {
            conn.execute(statement)
                .await
                .map_err(|e| DbError::transaction(e.to_string(), statement))?;
        });
        Ok(())
    }
}

#[async_trait]
impl Connection for DbConnection {
    async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Record>> {
        let records = with_dialect!(self, |conn, query| {
            query(sql, params)
                .fetch_all(&mut *conn)
                .await?
                .iter()
                .map(IntoRecord::to_record)
                .collect::<Vec<_>>()
        });
        debug!(sql = %sql, row_count = records.len(), "Fetched rows");
        Ok(records)
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<Record>> {
        let record = with_dialect!(self, |conn, query| {
            query(sql, params)
                .fetch_optional(&mut *conn)
                .await?
                .map(|row| row.to_record())
        });
        debug!(sql = %sql, found = record.is_some(), "Fetched optional row");
        Ok(record)
    }

    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let rows_affected = with_dialect!(self, |conn, query| {
            query(sql, params).execute(&mut *conn).await?.rows_affected()
        });
        debug!(sql = %sql, rows_affected, "Executed statement");
        Ok(rows_affected)
    }

    async fn stream_into(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        sink: &mpsc::Sender<DbResult<Record>>,
    ) -> DbResult<()> {
        with_dialect!(self, |conn, query| {
            let mut rows = query(sql, params).fetch(&mut *conn);
            while let Some(row) = rows.try_next().await? {
                if sink.send(Ok(row.to_record())).await.is_err() {
                    debug!(sql = %sql, "Row consumer went away, stopping fetch");
                    break;
                }
            }
        });
        Ok(())
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.control("BEGIN").await
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.control("COMMIT").await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.control("ROLLBACK").await
    }

    async fn close(self) -> DbResult<()> {
        match self {
            DbConnection::MySql(conn) => conn.close().await?,
            DbConnection::SQLite(conn) => conn.close().await?,
        }
        Ok(())
    }
}

/// Opens a fresh sqlx connection per request from a [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct SqlxConnector {
    config: ConnectionConfig,
}

impl SqlxConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn open(&self) -> DbResult<DbConnection> {
        let url = &self.config.connection_string;
        match self.config.db_type {
            DatabaseType::MySQL => {
                let options = MySqlConnectOptions::from_str(url)?;
                Ok(DbConnection::MySql(
                    MySqlConnection::connect_with(&options).await?,
                ))
            }
            DatabaseType::SQLite => {
                // The database file is created on first use
                let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
                Ok(DbConnection::SQLite(
                    SqliteConnection::connect_with(&options).await?,
                ))
            }
        }
    }
}

#[async_trait]
impl Connector for SqlxConnector {
    type Conn = DbConnection;

    async fn connect(&self) -> DbResult<DbConnection> {
        let connect_timeout = self.config.connect_timeout();
        let conn = match timeout(connect_timeout, self.open()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DbError::timeout(
                    "connection open",
                    connect_timeout.as_secs(),
                ));
            }
        };

        info!(
            db_type = %self.config.db_type,
            database = ?self.config.database,
            "Connection opened"
        );
        Ok(conn)
    }
}
