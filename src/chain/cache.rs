//! Query result cache.
//!
//! Results are keyed by the literal query text only. Two calls with the same
//! text but different bound parameters share one entry.

use super::{Layer, Next};
use crate::db::Connection;
use crate::error::DbResult;
use crate::models::{CallArgs, Output};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Unbounded map from query text to a previously computed result.
///
/// Clones share the same storage. Entries are never evicted or replaced.
#[derive(Debug, Clone, Default)]
pub struct QueryCache {
    entries: Arc<RwLock<HashMap<String, Output>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, query: &str) -> Option<Output> {
        self.entries.read().await.get(query).cloned()
    }

    pub async fn contains(&self, query: &str) -> bool {
        self.entries.read().await.contains_key(query)
    }

    /// Store `output` under `query` unless an entry already exists.
    ///
    /// Returns the stored value, which is the earlier one on a race.
    pub async fn insert(&self, query: impl Into<String>, output: Output) -> Output {
        let mut entries = self.entries.write().await;
        entries.entry(query.into()).or_insert(output).clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Serves results from a [`QueryCache`] keyed by the call's `query` argument.
///
/// Calls without a `query` argument are passed through uncached.
#[derive(Debug, Clone)]
pub struct CacheQuery {
    cache: QueryCache,
}

impl CacheQuery {
    pub fn new(cache: QueryCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<C: Connection> Layer<C> for CacheQuery {
    async fn around(&self, conn: &mut C, args: &CallArgs, next: Next<'_, C>) -> DbResult<Output> {
        let Some(query) = args.query_text() else {
            debug!(operation = %next.operation_name(), "No query argument, cache bypassed");
            return next.run(conn, args).await;
        };

        if let Some(hit) = self.cache.get(query).await {
            debug!(query = %query, "Using cached result");
            return Ok(hit);
        }

        debug!(query = %query, "Cache miss, executing query");
        let output = next.run(conn, args).await?;
        Ok(self.cache.insert(query, output).await)
    }
}
