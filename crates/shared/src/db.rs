//! Database utilities and connection management

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::{str::FromStr, time::Duration};

use crate::error::AuthError;

/// Create a database connection pool.
///
/// A failure here is fatal: the process must not serve traffic without a store.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, AuthError> {
    let options = PgConnectOptions::from_str(database_url)
        .map_err(|e| AuthError::Fatal(format!("invalid DATABASE_URL: {e}")))?;

    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(60))
        .max_lifetime(Duration::from_secs(300))
        .connect_with(options)
        .await
        .map_err(|e| AuthError::Fatal(format!("database connection failed: {e}")))
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}
