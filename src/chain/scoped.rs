//! Connection-scoped execution.

use super::Pipeline;
use crate::db::{Connection, Connector};
use crate::error::DbResult;
use crate::models::{CallArgs, Output};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs a pipeline on a connection opened for that single invocation.
///
/// The connection is closed exactly once on every path. If the pipeline
/// fails, its error is returned and a failure to close is only logged; if
/// the pipeline succeeds, a failure to close is returned.
pub struct Scoped<K: Connector> {
    connector: Arc<K>,
    pipeline: Pipeline<K::Conn>,
}

impl<K: Connector> Clone for Scoped<K> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<K: Connector> Scoped<K> {
    pub fn new(connector: Arc<K>, pipeline: Pipeline<K::Conn>) -> Self {
        Self {
            connector,
            pipeline,
        }
    }

    /// Open a connection, run the pipeline and close the connection.
    pub async fn invoke(&self, args: &CallArgs) -> DbResult<Output> {
        let mut conn = self.connector.connect().await?;
        let operation = self.pipeline.operation_name();
        debug!(
            operation = %operation,
            layers = self.pipeline.depth(),
            "Connection scope entered"
        );

        let result = self.pipeline.call(&mut conn, args).await;
        let closed = conn.close().await;
        debug!(operation = %operation, "Connection scope exited");

        match (result, closed) {
            (Err(e), Err(close_err)) => {
                warn!(
                    operation = %operation,
                    error = %close_err,
                    "Failed to close connection after error"
                );
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Ok(output), Ok(())) => Ok(output),
        }
    }
}
