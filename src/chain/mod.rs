//! Query execution wrapper chain.
//!
//! A base [`Operation`] takes a connection and call arguments and produces an
//! [`Output`]. Cross-cutting behaviour is layered around it as [`Layer`]s,
//! each of which receives a [`Next`] handle to the rest of the chain and
//! decides whether, when and how often to call it.
//!
//! Layers run in the order they were added: the first layer added is the
//! outermost. [`Scoped`] sits outside the whole pipeline and owns the
//! connection lifecycle.
//!
//! ```ignore
//! let fetch = Pipeline::new(RunQuery::new())
//!     .layer(LogQueries)
//!     .layer(Retry::new(3, Duration::from_secs(1))?)
//!     .scoped(connector);
//! let users = fetch.invoke(&CallArgs::query("SELECT * FROM users")).await?;
//! ```

pub mod cache;
pub mod logging;
pub mod retry;
pub mod scoped;
pub mod transaction;

pub use cache::{CacheQuery, QueryCache};
pub use logging::LogQueries;
pub use retry::Retry;
pub use scoped::Scoped;
pub use transaction::Transactional;

use crate::db::{Connection, Connector};
use crate::error::DbResult;
use crate::models::{CallArgs, Output};
use async_trait::async_trait;
use std::sync::Arc;

/// The unit of data-access work at the centre of a chain.
#[async_trait]
pub trait Operation<C: Connection>: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    async fn call(&self, conn: &mut C, args: &CallArgs) -> DbResult<Output>;
}

/// A cross-cutting behaviour wrapped around the rest of the chain.
#[async_trait]
pub trait Layer<C: Connection>: Send + Sync {
    async fn around(&self, conn: &mut C, args: &CallArgs, next: Next<'_, C>) -> DbResult<Output>;
}

/// The remainder of a chain, as seen from inside a layer.
///
/// `Next` is `Copy`, so a layer may run the rest of the chain any number of
/// times (retry) or not at all (cache hit).
pub struct Next<'a, C: Connection> {
    layers: &'a [Arc<dyn Layer<C>>],
    operation: &'a dyn Operation<C>,
}

impl<C: Connection> Clone for Next<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: Connection> Copy for Next<'_, C> {}

impl<'a, C: Connection> Next<'a, C> {
    /// Name of the operation at the centre of the chain.
    pub fn operation_name(&self) -> &'a str {
        self.operation.name()
    }

    /// Run the remaining layers and then the operation.
    pub async fn run(self, conn: &mut C, args: &CallArgs) -> DbResult<Output> {
        match self.layers.split_first() {
            Some((layer, rest)) => {
                let next = Next {
                    layers: rest,
                    operation: self.operation,
                };
                layer.around(conn, args, next).await
            }
            None => self.operation.call(conn, args).await,
        }
    }
}

/// An operation together with the layers wrapped around it.
pub struct Pipeline<C: Connection> {
    layers: Vec<Arc<dyn Layer<C>>>,
    operation: Arc<dyn Operation<C>>,
}

impl<C: Connection> Clone for Pipeline<C> {
    fn clone(&self) -> Self {
        Self {
            layers: self.layers.clone(),
            operation: Arc::clone(&self.operation),
        }
    }
}

impl<C: Connection> Pipeline<C> {
    pub fn new(operation: impl Operation<C> + 'static) -> Self {
        Self {
            layers: Vec::new(),
            operation: Arc::new(operation),
        }
    }

    /// Wrap the chain built so far inside `layer`'s successors: layers added
    /// later sit closer to the operation.
    pub fn layer(mut self, layer: impl Layer<C> + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn operation_name(&self) -> &str {
        self.operation.name()
    }

    /// Run the chain on a connection supplied by the caller.
    pub async fn call(&self, conn: &mut C, args: &CallArgs) -> DbResult<Output> {
        let next = Next {
            layers: &self.layers,
            operation: self.operation.as_ref(),
        };
        next.run(conn, args).await
    }

    /// Give the chain its own connection per invocation.
    pub fn scoped<K>(self, connector: Arc<K>) -> Scoped<K>
    where
        K: Connector<Conn = C>,
    {
        Scoped::new(connector, self)
    }
}
