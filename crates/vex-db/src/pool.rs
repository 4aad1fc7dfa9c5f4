//! Connection pool construction.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::DbError;

/// Open a Postgres pool and verify it with a round trip.
///
/// # Errors
///
/// Returns `DbError::ConnectionFailed` if the server is unreachable or the
/// DSN is rejected.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .map_err(DbError::ConnectionFailed)?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(DbError::ConnectionFailed)?;

    tracing::info!(max_connections, "Database pool ready");
    Ok(pool)
}
