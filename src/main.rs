//! query-chain - Main entry point.
//!
//! Runs one user operation against the configured database and prints the
//! result as JSON on stdout. Logs go to stderr.

use futures_util::TryStreamExt;
use query_chain::DbError;
use query_chain::config::{Command, Config};
use query_chain::context::AppContext;
use query_chain::db::SqlxConnector;
use query_chain::stream;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(
    ctx: &AppContext<SqlxConnector>,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::FetchUsers { query } => print_json(&ctx.fetch_all_users(&query).await?),
        Command::GetUser { user_id } => print_json(&ctx.get_user_by_id(user_id).await?),
        Command::UpdateEmail { user_id, new_email } => {
            let affected = ctx.update_user_email(user_id, &new_email).await?;
            print_json(&serde_json::json!({ "rows_affected": affected }))
        }
        Command::FetchWithRetry => print_json(&ctx.fetch_users_with_retry().await?),
        Command::FetchWithCache { query, repeat } => {
            let mut rows = Vec::new();
            for _ in 0..repeat.max(1) {
                rows = ctx.fetch_users_with_cache(&query).await?;
            }
            info!(entries = ctx.cache().len().await, "Query cache size");
            print_json(&rows)
        }
        Command::Execute { query, params } => {
            print_json(&ctx.execute_query(&query, params).await?)
        }
        Command::StreamUsers { batch_size } => {
            let mut rows = match batch_size {
                Some(size) => stream::stream_users_in_batches(ctx.connector(), size)?,
                None => stream::stream_users(ctx.connector()),
            };
            while let Some(row) = rows.try_next().await? {
                println!("{}", serde_json::to_string(&row)?);
            }
            Ok(())
        }
        Command::BatchProcessing {
            batch_size,
            min_age,
        } => print_json(&stream::batch_processing(ctx.connector(), batch_size, min_age).await?),
        Command::AverageAge => {
            let average = stream::compute_average_age(ctx.connector()).await?;
            if average.is_none() {
                info!("No users found");
            }
            print_json(&serde_json::json!({ "average_age": average }))
        }
        Command::FetchConcurrently => print_json(&ctx.fetch_concurrently().await?),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    info!("Starting query-chain v{}", env!("CARGO_PKG_VERSION"));

    let ctx = AppContext::from_config(&config)?;
    if let Err(e) = run(&ctx, config.command.clone()).await {
        let suggestion = e.downcast_ref::<DbError>().and_then(DbError::suggestion);
        error!(error = %e, suggestion = ?suggestion, "Command failed");
        return Err(e);
    }
    Ok(())
}
