//! Database schema migrations
//!
//! Versioned, idempotent migrations applied after the CREATE TABLE pass so
//! databases created by older builds pick up new columns without data loss.
//!
//! # Migration Guidelines
//!
//! 1. Never modify an existing migration
//! 2. Add a new migration function for each schema change
//! 3. Check for the column/table first so reruns are no-ops
//! 4. Prefer ALTER TABLE over DROP/CREATE to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// Increment this when adding new migrations.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

/// Migration v1: add the `extra` column for unmodeled upstream fields
///
/// Early databases stored only the modeled columns and dropped anything else
/// the scrapers sent.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    add_column_if_missing(
        pool,
        "reservations",
        "extra",
        "ALTER TABLE reservations ADD COLUMN extra TEXT NOT NULL DEFAULT '{}'",
    )
    .await
}

/// Migration v2: add the `version` column used for conditional writes
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    add_column_if_missing(
        pool,
        "reservations",
        "version",
        "ALTER TABLE reservations ADD COLUMN version INTEGER NOT NULL DEFAULT 1",
    )
    .await
}

async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    alter_sql: &str,
) -> Result<()> {
    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?",
    )
    .bind(table)
    .bind(column)
    .fetch_one(pool)
    .await?;

    if has_column > 0 {
        info!("  {}.{} already exists - skipping", table, column);
        return Ok(());
    }

    match sqlx::query(alter_sql).execute(pool).await {
        Ok(_) => {
            info!("  Added {} column to {} table", column, table);
            Ok(())
        }
        // Concurrent initializer added it first
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
