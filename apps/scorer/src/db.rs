use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
///
/// `timeout` bounds both connection acquisition and every statement
/// (`statement_timeout`), so no database call can block a run indefinitely.
pub async fn create_pool(database_url: &str, timeout: Duration) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let options = PgConnectOptions::from_str(database_url)?
        .options([("statement_timeout", timeout.as_millis().to_string())]);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(timeout)
        .connect_with(options)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}
