//! Transactional execution.

use super::{Layer, Next};
use crate::db::Connection;
use crate::error::DbResult;
use crate::models::{CallArgs, Output};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Runs the rest of the chain inside a transaction on the caller's
/// connection.
///
/// Success commits, and a commit failure is returned to the caller. Failure
/// rolls back and returns the original error unchanged; a failed rollback
/// is logged and never replaces it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transactional;

#[async_trait]
impl<C: Connection> Layer<C> for Transactional {
    async fn around(&self, conn: &mut C, args: &CallArgs, next: Next<'_, C>) -> DbResult<Output> {
        let operation = next.operation_name();
        conn.begin().await?;
        debug!(operation = %operation, "Transaction started");

        match next.run(conn, args).await {
            Ok(output) => {
                conn.commit().await?;
                debug!(operation = %operation, "Transaction committed");
                Ok(output)
            }
            Err(e) => {
                match conn.rollback().await {
                    Ok(()) => info!(
                        operation = %operation,
                        error = %e,
                        "Transaction rolled back"
                    ),
                    Err(rollback_err) => warn!(
                        operation = %operation,
                        error = %e,
                        rollback_error = %rollback_err,
                        "Rollback failed"
                    ),
                }
                Err(e)
            }
        }
    }
}
