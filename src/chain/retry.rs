//! Fixed-delay retry.

use super::{Layer, Next};
use crate::db::Connection;
use crate::error::{DbError, DbResult};
use crate::models::{CallArgs, Output};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Re-runs the rest of the chain after any failure, up to `max_attempts`
/// total attempts, sleeping a constant `delay` in between.
///
/// Attempts share the connection the outer scope supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    max_attempts: u32,
    delay: Duration,
}

impl Retry {
    pub fn new(max_attempts: u32, delay: Duration) -> DbResult<Self> {
        if max_attempts == 0 {
            return Err(DbError::invalid_input(
                "retry max_attempts must be at least 1",
            ));
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

#[async_trait]
impl<C: Connection> Layer<C> for Retry {
    async fn around(&self, conn: &mut C, args: &CallArgs, next: Next<'_, C>) -> DbResult<Output> {
        let operation = next.operation_name();
        let mut attempt = 0;
        loop {
            match next.run(conn, args).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        error!(
                            operation = %operation,
                            attempts = self.max_attempts,
                            error = %e,
                            "Operation failed after all attempts"
                        );
                        return Err(e);
                    }
                    warn!(
                        operation = %operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
