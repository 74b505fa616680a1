//! Database migration management.
//!
//! Embeds one SQL migration set per backend and applies them with `SQLx`'s
//! migrator, which tracks applied versions in `_sqlx_migrations`.

use crate::error::{Result, StoreError};
use sqlx::{PgPool, SqlitePool};

/// Number of migrations shipped for each backend.
pub const MIGRATION_COUNT: i64 = 3;

/// Run all pending `SQLite` migrations.
pub async fn run_sqlite_migrations(pool: &SqlitePool) -> Result<()> {
    tracing::info!("Running sqlite migrations");

    sqlx::migrate!("./migrations/sqlite")
        .run(pool)
        .await
        .map_err(|e| StoreError::Migration(format!("sqlite migration failed: {e}")))?;

    tracing::info!("Sqlite migrations completed");
    Ok(())
}

/// Run all pending Postgres migrations.
pub async fn run_postgres_migrations(pool: &PgPool) -> Result<()> {
    tracing::info!("Running postgres migrations");

    sqlx::migrate!("./migrations/postgres")
        .run(pool)
        .await
        .map_err(|e| StoreError::Migration(format!("postgres migration failed: {e}")))?;

    tracing::info!("Postgres migrations completed");
    Ok(())
}

/// Highest applied `SQLite` migration version, 0 if none.
pub async fn sqlite_schema_version(pool: &SqlitePool) -> Result<i64> {
    let table_exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?
        > 0;

    if !table_exists {
        return Ok(0);
    }

    let version =
        sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(version), 0) FROM _sqlx_migrations")
            .fetch_one(pool)
            .await?;

    Ok(version)
}
