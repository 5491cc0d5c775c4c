//! Application context shared by the user operations.

use crate::chain::{QueryCache, Retry};
use crate::config::Config;
use crate::db::{Connector, SqlxConnector};
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use tracing::info;

/// Everything the operations need that outlives a single call: the connector,
/// the query cache and the retry policy.
///
/// Cloning is cheap and clones share the cache.
#[derive(Debug)]
pub struct AppContext<K: Connector> {
    connector: Arc<K>,
    cache: QueryCache,
    retry: Retry,
}

impl<K: Connector> Clone for AppContext<K> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            cache: self.cache.clone(),
            retry: self.retry,
        }
    }
}

impl<K: Connector> AppContext<K> {
    pub fn new(connector: K) -> Self {
        Self {
            connector: Arc::new(connector),
            cache: QueryCache::new(),
            retry: Retry::default(),
        }
    }

    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    pub fn connector(&self) -> Arc<K> {
        Arc::clone(&self.connector)
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn retry(&self) -> Retry {
        self.retry
    }
}

impl AppContext<SqlxConnector> {
    /// Build a context that opens sqlx connections as described by `config`.
    pub fn from_config(config: &Config) -> DbResult<Self> {
        let connection = config.connection_config().map_err(DbError::invalid_input)?;
        let retry = Retry::new(config.retries, config.retry_delay())?;
        info!(
            db_type = %connection.db_type,
            url = %connection.masked_connection_string(),
            max_attempts = retry.max_attempts(),
            "Application context ready"
        );
        Ok(Self::new(SqlxConnector::new(connection)).with_retry(retry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Output;
    use crate::testing::MockConnector;
    use clap::Parser;
    use std::time::Duration;

    #[tokio::test]
    async fn test_clones_share_cache() {
        let ctx = AppContext::new(MockConnector::with_rows(Vec::new()));
        let other = ctx.clone();
        assert!(Arc::ptr_eq(&ctx.connector(), &other.connector()));
        assert_eq!(ctx.retry(), Retry::default());

        ctx.cache().insert("SELECT 1", Output::Affected(1)).await;
        assert!(other.cache().contains("SELECT 1").await);
        assert_eq!(other.cache().get("SELECT 1").await, Some(Output::Affected(1)));

        other.cache().clear().await;
        assert!(ctx.cache().is_empty().await);
    }

    #[test]
    fn test_from_config() {
        let config = Config::try_parse_from([
            "query-chain",
            "-d",
            "sqlite:users.db",
            "--retries",
            "5",
            "--retry-delay-ms",
            "20",
            "average-age",
        ])
        .unwrap();
        let ctx = AppContext::from_config(&config).unwrap();
        assert_eq!(ctx.retry().max_attempts(), 5);
        assert_eq!(ctx.retry().delay(), Duration::from_millis(20));
        assert_eq!(ctx.connector().config().database.as_deref(), Some("users"));
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let config =
            Config::try_parse_from(["query-chain", "-d", "postgres://h/db", "average-age"]).unwrap();
        let err = AppContext::from_config(&config).unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }
}
