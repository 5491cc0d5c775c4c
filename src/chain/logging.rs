//! Query logging.

use super::{Layer, Next};
use crate::db::Connection;
use crate::error::DbResult;
use crate::models::{CallArgs, Output};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

/// Logs the query text (or the operation name when the call carries no
/// query) with a timestamp, then delegates.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogQueries;

#[async_trait]
impl<C: Connection> Layer<C> for LogQueries {
    async fn around(&self, conn: &mut C, args: &CallArgs, next: Next<'_, C>) -> DbResult<Output> {
        let query = args.query_text().unwrap_or_else(|| next.operation_name());
        info!(query = %query, started_at = %Utc::now().to_rfc3339(), "Executing query");

        let result = next.run(conn, args).await;
        match &result {
            Ok(output) => info!(
                query = %query,
                finished_at = %Utc::now().to_rfc3339(),
                rows = output.len(),
                "Query finished"
            ),
            Err(e) => warn!(
                query = %query,
                finished_at = %Utc::now().to_rfc3339(),
                error = %e,
                "Query failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Operation, Pipeline};
    use crate::testing::{MockConnection, MockConnector, MockState, user_rows};
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    struct FetchAll;

    #[async_trait]
    impl Operation<MockConnection> for FetchAll {
        fn name(&self) -> &str {
            "fetch_all"
        }

        async fn call(&self, conn: &mut MockConnection, _args: &CallArgs) -> DbResult<Output> {
            Ok(Output::Rows(conn.fetch_all("SELECT * FROM users", &[]).await?))
        }
    }

    #[tokio::test]
    async fn test_passes_result_through() {
        let connector = Arc::new(MockConnector::with_rows(user_rows(2)));
        let scoped = Pipeline::new(FetchAll)
            .layer(LogQueries)
            .scoped(connector.clone());

        let out = scoped
            .invoke(&CallArgs::query("SELECT * FROM users"))
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(MockState::count(&connector.state.fetches), 1);
    }

    #[tokio::test]
    async fn test_passes_error_through() {
        let connector = Arc::new(MockConnector::new(MockState {
            failing_calls: 1.into(),
            ..MockState::default()
        }));
        let scoped = Pipeline::new(FetchAll)
            .layer(LogQueries)
            .scoped(connector.clone());

        assert!(scoped.invoke(&CallArgs::new()).await.is_err());
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn test_failure_logged_at_warn() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let connector = Arc::new(MockConnector::new(MockState {
            failing_calls: 1.into(),
            ..MockState::default()
        }));
        let scoped = Pipeline::new(FetchAll)
            .layer(LogQueries)
            .scoped(connector.clone());
        assert!(scoped.invoke(&CallArgs::query("SELECT 1")).await.is_err());

        let lines = captured.lines();
        let failed = lines
            .iter()
            .find(|line| line.contains("Query failed"))
            .expect("failure line");
        assert!(failed.contains("WARN"), "got {failed}");
        assert!(failed.contains("SELECT 1"));
        let started = lines
            .iter()
            .find(|line| line.contains("Executing query"))
            .expect("start line");
        assert!(started.contains("INFO"));
    }
}
