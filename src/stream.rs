//! Lazy row streaming.
//!
//! A [`RowStream`] pages through a result set on demand. The rows are read by
//! a producer task that owns its own connection and hands them over through
//! a channel with room for a single row, so the database is only read as far
//! as the consumer has pulled.
//!
//! Nothing is opened until the stream is first polled. Once opened, the
//! connection is closed exactly once: when the rows run out, when the stream
//! is [closed](RowStream::close), or when it is dropped part way through.

use crate::db::{Connection, Connector};
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, Record, USERS_TABLE, User, numeric_value};
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Stream, StreamExt, TryStreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Rows per page when the caller has no preference.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Age threshold [`batch_processing`] is usually run with.
pub const DEFAULT_MIN_AGE: f64 = 25.0;

type RowSender = mpsc::Sender<DbResult<Record>>;

/// What a producer reads from.
#[derive(Debug, Clone)]
enum Source {
    /// One query, rows forwarded as the driver yields them.
    Query {
        sql: String,
        params: Vec<QueryParam>,
    },
    /// A whole table, read with `LIMIT ? OFFSET ?` pages.
    Batches { table: String, batch_size: i64 },
}

impl Source {
    fn describe(&self) -> &str {
        match self {
            Source::Query { sql, .. } => sql,
            Source::Batches { table, .. } => table,
        }
    }
}

/// A one-shot, finite stream of rows.
///
/// Yields `Err` at most once, after which the stream ends.
pub struct RowStream {
    rx: mpsc::Receiver<DbResult<Record>>,
    pending: Option<BoxFuture<'static, ()>>,
    producer: Option<JoinHandle<()>>,
}

impl RowStream {
    fn new<K: Connector>(connector: Arc<K>, source: Source) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            rx,
            pending: Some(produce(connector, source, tx).boxed()),
            producer: None,
        }
    }

    /// Stop reading and wait until the connection has been released.
    ///
    /// Rows already read but not yet consumed are discarded.
    pub async fn close(mut self) {
        self.rx.close();
        // Never polled: nothing was opened
        self.pending = None;
        if let Some(producer) = self.producer.take() {
            if let Err(e) = producer.await {
                warn!(error = %e, "Row stream producer did not finish cleanly");
            }
        }
    }
}

impl Stream for RowStream {
    type Item = DbResult<Record>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(start) = this.pending.take() {
            this.producer = Some(tokio::spawn(start));
        }
        this.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("started", &self.pending.is_none())
            .finish()
    }
}

async fn produce<K: Connector>(connector: Arc<K>, source: Source, tx: RowSender) {
    let mut conn = match connector.connect().await {
        Ok(conn) => conn,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            return;
        }
    };
    debug!(source = %source.describe(), "Row stream opened");

    let result = match &source {
        Source::Query { sql, params } => conn.stream_into(sql, params, &tx).await,
        Source::Batches { table, batch_size } => {
            page_through(&mut conn, table, *batch_size, &tx).await
        }
    };
    let failed = result.is_err();
    if let Err(e) = result {
        let _ = tx.send(Err(e)).await;
    }

    match conn.close().await {
        Ok(()) => debug!(source = %source.describe(), "Row stream closed"),
        Err(e) if failed => warn!(error = %e, "Failed to close connection after stream error"),
        Err(e) => {
            if tx.send(Err(e)).await.is_err() {
                warn!(source = %source.describe(), "Failed to close connection for abandoned stream");
            }
        }
    }
}

async fn page_through<C: Connection>(
    conn: &mut C,
    table: &str,
    batch: i64,
    tx: &RowSender,
) -> DbResult<()> {
    let count_sql = format!("SELECT COUNT(*) AS total FROM {table}");
    let total = conn
        .fetch_optional(&count_sql, &[])
        .await?
        .and_then(|row| row.get("total").and_then(numeric_value))
        .unwrap_or_default() as i64;

    let page_sql = format!("SELECT * FROM {table} LIMIT ? OFFSET ?");
    let mut offset = 0;
    while offset < total {
        let page = conn
            .fetch_all(&page_sql, &[QueryParam::Int(batch), QueryParam::Int(offset)])
            .await?;
        debug!(table = %table, offset, rows = page.len(), "Fetched batch");
        if page.is_empty() {
            break;
        }
        for row in page {
            if tx.send(Ok(row)).await.is_err() {
                debug!(table = %table, "Row consumer went away, stopping paging");
                return Ok(());
            }
        }
        offset = offset.saturating_add(batch);
    }
    Ok(())
}

/// Page sizes are bound as SQL integers, so they must fit in an `i64`.
pub fn checked_batch_size(batch_size: usize) -> DbResult<i64> {
    match i64::try_from(batch_size) {
        Ok(0) => Err(DbError::invalid_input("batch size must be at least 1")),
        Ok(size) => Ok(size),
        Err(_) => Err(DbError::invalid_input(format!(
            "batch size must be at most {}",
            i64::MAX
        ))),
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Stream the rows of `sql` one at a time.
pub fn stream_rows<K: Connector>(
    connector: Arc<K>,
    sql: impl Into<String>,
    params: Vec<QueryParam>,
) -> RowStream {
    RowStream::new(
        connector,
        Source::Query {
            sql: sql.into(),
            params,
        },
    )
}

/// Stream every row of `table`, reading `batch_size` rows per round trip.
pub fn stream_table_in_batches<K: Connector>(
    connector: Arc<K>,
    table: &str,
    batch_size: usize,
) -> DbResult<RowStream> {
    let batch_size = checked_batch_size(batch_size)?;
    if !is_identifier(table) {
        return Err(DbError::invalid_input(format!(
            "'{table}' is not a valid table name"
        )));
    }
    Ok(RowStream::new(
        connector,
        Source::Batches {
            table: table.to_string(),
            batch_size,
        },
    ))
}

pub fn stream_users<K: Connector>(connector: Arc<K>) -> RowStream {
    stream_rows(connector, format!("SELECT * FROM {USERS_TABLE}"), Vec::new())
}

pub fn stream_users_in_batches<K: Connector>(
    connector: Arc<K>,
    batch_size: usize,
) -> DbResult<RowStream> {
    stream_table_in_batches(connector, USERS_TABLE, batch_size)
}

/// Stream each user's age. A row without a numeric age is an error.
pub fn stream_user_ages<K: Connector>(
    connector: Arc<K>,
) -> impl Stream<Item = DbResult<f64>> + Send + Unpin {
    stream_rows(connector, format!("SELECT age FROM {USERS_TABLE}"), Vec::new()).map(|row| {
        let row = row?;
        row.get("age")
            .and_then(numeric_value)
            .ok_or_else(|| DbError::schema("Column 'age' is not numeric", USERS_TABLE))
    })
}

/// Mean user age, or `None` when there are no users.
pub async fn compute_average_age<K: Connector>(connector: Arc<K>) -> DbResult<Option<f64>> {
    let mut ages = stream_user_ages(connector);
    let mut total = 0.0;
    let mut count = 0_u64;
    while let Some(age) = ages.try_next().await? {
        total += age;
        count += 1;
    }
    if count == 0 {
        debug!("No users found");
        return Ok(None);
    }
    let average = total / count as f64;
    debug!(average, count, "Computed average age");
    Ok(Some(average))
}

/// Users strictly older than `min_age`, read in batches of `batch_size`.
pub async fn batch_processing<K: Connector>(
    connector: Arc<K>,
    batch_size: usize,
    min_age: f64,
) -> DbResult<Vec<User>> {
    let mut rows = stream_users_in_batches(connector, batch_size)?;
    let mut selected = Vec::new();
    while let Some(row) = rows.try_next().await? {
        let user = User::from_record(&row)?;
        if user.age.is_some_and(|age| age > min_age) {
            selected.push(user);
        }
    }
    debug!(batch_size, min_age, selected = selected.len(), "Batch processing done");
    Ok(selected)
}
