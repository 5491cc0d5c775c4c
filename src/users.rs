//! Operations on the `users` table and the wrapper chains they run in.
//!
//! Each public method on [`AppContext`] assembles its chain from the building
//! blocks in [`crate::chain`]:
//!
//! | method                   | chain (outermost first)             |
//! |--------------------------|-------------------------------------|
//! | `fetch_all_users`        | connection, log                     |
//! | `get_user_by_id`         | connection                          |
//! | `update_user_email`      | connection, transaction             |
//! | `fetch_users_with_retry` | connection, retry                   |
//! | `fetch_users_with_cache` | connection, cache                   |
//! | `execute_query`          | connection                          |

use crate::chain::{CacheQuery, LogQueries, Operation, Pipeline, Transactional};
use crate::context::AppContext;
use crate::db::{Connection, Connector};
use crate::error::{DbError, DbResult};
use crate::models::{CallArgs, Output, QueryParam, Record, USERS_TABLE};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

pub const USER_ID_ARG: &str = "user_id";
pub const NEW_EMAIL_ARG: &str = "new_email";

/// Age above which [`AppContext::fetch_concurrently`] counts a user as older.
pub const OLDER_USER_AGE: i64 = 40;

fn required<'a>(args: &'a CallArgs, name: &str) -> DbResult<&'a QueryParam> {
    args.get(name)
        .ok_or_else(|| DbError::invalid_input(format!("missing argument '{name}'")))
}

fn required_i64(args: &CallArgs, name: &str) -> DbResult<i64> {
    required(args, name)?
        .as_i64()
        .ok_or_else(|| DbError::invalid_input(format!("argument '{name}' must be an integer")))
}

fn required_str<'a>(args: &'a CallArgs, name: &str) -> DbResult<&'a str> {
    required(args, name)?
        .as_str()
        .ok_or_else(|| DbError::invalid_input(format!("argument '{name}' must be text")))
}

/// Run a query and return every row.
///
/// The SQL is either fixed at construction or read from the call's `query`
/// argument. Positional arguments are bound in order.
#[derive(Debug, Clone, Default)]
pub struct RunQuery {
    sql: Option<String>,
}

impl RunQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixed(sql: impl Into<String>) -> Self {
        Self {
            sql: Some(sql.into()),
        }
    }
}

#[async_trait]
impl<C: Connection> Operation<C> for RunQuery {
    fn name(&self) -> &str {
        "run_query"
    }

    async fn call(&self, conn: &mut C, args: &CallArgs) -> DbResult<Output> {
        let sql = match &self.sql {
            Some(sql) => sql.as_str(),
            None => args
                .query_text()
                .ok_or_else(|| DbError::invalid_input("missing argument 'query'"))?,
        };
        Ok(Output::Rows(conn.fetch_all(sql, &args.positional).await?))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchUserById;

#[async_trait]
impl<C: Connection> Operation<C> for FetchUserById {
    fn name(&self) -> &str {
        "get_user_by_id"
    }

    async fn call(&self, conn: &mut C, args: &CallArgs) -> DbResult<Output> {
        let user_id = required_i64(args, USER_ID_ARG)?;
        let sql = format!("SELECT * FROM {USERS_TABLE} WHERE id = ?");
        let row = conn.fetch_optional(&sql, &[QueryParam::Int(user_id)]).await?;
        Ok(Output::Row(row))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateUserEmail;

#[async_trait]
impl<C: Connection> Operation<C> for UpdateUserEmail {
    fn name(&self) -> &str {
        "update_user_email"
    }

    async fn call(&self, conn: &mut C, args: &CallArgs) -> DbResult<Output> {
        let user_id = required_i64(args, USER_ID_ARG)?;
        let new_email = required_str(args, NEW_EMAIL_ARG)?;
        let sql = format!("UPDATE {USERS_TABLE} SET email = ? WHERE id = ?");
        let affected = conn
            .execute(&sql, &[QueryParam::from(new_email), QueryParam::Int(user_id)])
            .await?;
        Ok(Output::Affected(affected))
    }
}

/// Results of [`AppContext::fetch_concurrently`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcurrentFetch {
    pub all_users: Vec<Record>,
    pub older_users: Vec<Record>,
}

impl<K: Connector> AppContext<K> {
    pub async fn fetch_all_users(&self, query: &str) -> DbResult<Vec<Record>> {
        Pipeline::new(RunQuery::new())
            .layer(LogQueries)
            .scoped(self.connector())
            .invoke(&CallArgs::query(query))
            .await
            .map(Output::into_rows)
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> DbResult<Option<Record>> {
        Pipeline::new(FetchUserById)
            .scoped(self.connector())
            .invoke(&CallArgs::new().with_named(USER_ID_ARG, user_id))
            .await
            .map(Output::into_row)
    }

    /// Returns the number of rows changed; zero when the user does not exist.
    pub async fn update_user_email(&self, user_id: i64, new_email: &str) -> DbResult<u64> {
        let args = CallArgs::new()
            .with_named(USER_ID_ARG, user_id)
            .with_named(NEW_EMAIL_ARG, new_email);
        let output = Pipeline::new(UpdateUserEmail)
            .layer(Transactional)
            .scoped(self.connector())
            .invoke(&args)
            .await?;
        let affected = output.rows_affected().unwrap_or_default();
        info!(user_id, affected, "User email updated");
        Ok(affected)
    }

    pub async fn fetch_users_with_retry(&self) -> DbResult<Vec<Record>> {
        Pipeline::new(RunQuery::fixed(format!("SELECT * FROM {USERS_TABLE}")))
            .layer(self.retry())
            .scoped(self.connector())
            .invoke(&CallArgs::new())
            .await
            .map(Output::into_rows)
    }

    /// Served from the context's cache when `query` was run before.
    pub async fn fetch_users_with_cache(&self, query: &str) -> DbResult<Vec<Record>> {
        Pipeline::new(RunQuery::new())
            .layer(CacheQuery::new(self.cache().clone()))
            .scoped(self.connector())
            .invoke(&CallArgs::query(query))
            .await
            .map(Output::into_rows)
    }

    /// Run a parameterised query on a connection of its own.
    pub async fn execute_query(&self, query: &str, params: Vec<QueryParam>) -> DbResult<Vec<Record>> {
        let args = CallArgs {
            positional: params,
            ..CallArgs::query(query)
        };
        Pipeline::new(RunQuery::new())
            .scoped(self.connector())
            .invoke(&args)
            .await
            .map(Output::into_rows)
    }

    /// Fetch all users and the users older than [`OLDER_USER_AGE`] at the
    /// same time, each on its own connection.
    pub async fn fetch_concurrently(&self) -> DbResult<ConcurrentFetch> {
        let all_sql = format!("SELECT * FROM {USERS_TABLE}");
        let older_sql = format!("SELECT * FROM {USERS_TABLE} WHERE age > ?");
        let (all_users, older_users) = tokio::join!(
            self.execute_query(&all_sql, Vec::new()),
            self.execute_query(&older_sql, vec![QueryParam::Int(OLDER_USER_AGE)]),
        );
        Ok(ConcurrentFetch {
            all_users: all_users?,
            older_users: older_users?,
        })
    }
}
