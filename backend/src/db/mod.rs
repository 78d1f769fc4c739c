//! Postgres plumbing for `PgUserStore`
//!
//! Only needed when `store = "postgres"`.

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect a pool sized from `[database]` config
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let options = PgConnectOptions::from_str(database_url)
        .context("invalid database url")?
        .application_name("livecode-credentials");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
        .context("failed to connect user store")?;

    info!(max_connections, "User store pool ready");
    Ok(pool)
}

/// Apply the embedded `users` migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

/// `SELECT 1` probe behind `/health/ready`
pub async fn health_check(pool: &PgPool) -> Result<()> {
    if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
        warn!(error = %e, "User store probe failed");
        return Err(e.into());
    }
    Ok(())
}
