//! In-memory connector for unit tests.
//!
//! Every lifecycle call is counted so tests can assert exactly how often a
//! wrapper opened, closed, committed or rolled back a connection.

use crate::db::{Connection, Connector};
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, Record};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub fetches: AtomicUsize,
    pub executes: AtomicUsize,
    /// Remaining fetch/execute calls that fail before calls succeed again.
    pub failing_calls: AtomicUsize,
    pub rows: Vec<Record>,
    pub fail_connect: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    pub fail_close: bool,
}

impl MockState {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> DbResult<()> {
        let remaining = self.failing_calls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_calls.store(remaining - 1, Ordering::SeqCst);
            return Err(DbError::connection("database is locked", "retry later"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockConnector {
    pub state: Arc<MockState>,
}

impl MockConnector {
    pub fn new(state: MockState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn with_rows(rows: Vec<Record>) -> Self {
        Self::new(MockState {
            rows,
            ..MockState::default()
        })
    }

    pub fn opens(&self) -> usize {
        MockState::count(&self.state.opens)
    }

    pub fn closes(&self) -> usize {
        MockState::count(&self.state.closes)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Conn = MockConnection;

    async fn connect(&self) -> DbResult<MockConnection> {
        if self.state.fail_connect {
            return Err(DbError::connection(
                "unable to open database file",
                "Check the path",
            ));
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub(crate) struct MockConnection {
    state: Arc<MockState>,
}

impl MockConnection {
    /// `COUNT(*)` queries answer with the row total, `LIMIT ? OFFSET ?`
    /// queries with the matching slice, anything else with every row.
    fn answer(&self, sql: &str, params: &[QueryParam]) -> Vec<Record> {
        let rows = &self.state.rows;
        if sql.contains("COUNT(") {
            let mut total = Record::new();
            total.insert("total".to_string(), json!(rows.len()));
            return vec![total];
        }
        if sql.contains("LIMIT") {
            if let [limit, offset] = params {
                let limit = limit.as_i64().unwrap_or_default() as usize;
                let offset = offset.as_i64().unwrap_or_default() as usize;
                return rows.iter().skip(offset).take(limit).cloned().collect();
            }
        }
        rows.clone()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Record>> {
        self.state.fetches.fetch_add(1, Ordering::SeqCst);
        self.state.take_failure()?;
        Ok(self.answer(sql, params))
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<Record>> {
        self.state.fetches.fetch_add(1, Ordering::SeqCst);
        self.state.take_failure()?;
        Ok(self.answer(sql, params).into_iter().next())
    }

    async fn execute(&mut self, _sql: &str, _params: &[QueryParam]) -> DbResult<u64> {
        self.state.executes.fetch_add(1, Ordering::SeqCst);
        self.state.take_failure()?;
        Ok(1)
    }

    async fn stream_into(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        sink: &mpsc::Sender<DbResult<Record>>,
    ) -> DbResult<()> {
        self.state.fetches.fetch_add(1, Ordering::SeqCst);
        self.state.take_failure()?;
        for row in self.answer(sql, params) {
            if sink.send(Ok(row)).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.state.begins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_commit {
            return Err(DbError::transaction("database is locked", "commit"));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_rollback {
            return Err(DbError::transaction("no transaction is active", "rollback"));
        }
        Ok(())
    }

    async fn close(self) -> DbResult<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_close {
            return Err(DbError::internal("close failed"));
        }
        Ok(())
    }
}

/// `count` user rows with ids starting at 1 and ages 20, 25, 30, ...
pub(crate) fn user_rows(count: usize) -> Vec<Record> {
    (1..=count)
        .map(|i| {
            json!({
                "id": i,
                "name": format!("user{i}"),
                "email": format!("user{i}@example.com"),
                "age": 15 + 5 * i,
            })
            .as_object()
            .cloned()
            .unwrap_or_default()
        })
        .collect()
}
