//! Settings database operations
//!
//! Key-value accessors for the settings table plus the typed bundle of
//! runtime tunables the reconciliation engine reads at startup.

use crate::time::millis_to_duration;
use crate::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::time::Duration;

/// Runtime tunables stored in the settings table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Deadline for a single store call
    pub store_timeout: Duration,
    /// Total time a locked write may be retried
    pub max_lock_wait_ms: u64,
    /// Read-decide-write attempts per record before reporting a conflict
    pub reconcile_max_attempts: u32,
    /// Deadline for a single notifier call
    pub notifier_timeout: Duration,
    /// Pending notifications held before new ones are dropped
    pub outbox_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            store_timeout: millis_to_duration(5000),
            max_lock_wait_ms: 5000,
            reconcile_max_attempts: 5,
            notifier_timeout: millis_to_duration(3000),
            outbox_capacity: 256,
        }
    }
}

/// Load engine settings, falling back to defaults for missing keys
pub async fn load_engine_settings(db: &Pool<Sqlite>) -> Result<EngineSettings> {
    let defaults = EngineSettings::default();

    let store_timeout_ms: Option<u64> = get_setting(db, "store_timeout_ms").await?;
    let max_lock_wait_ms: Option<u64> = get_setting(db, "db_max_lock_wait_ms").await?;
    let max_attempts: Option<u32> = get_setting(db, "reconcile_max_attempts").await?;
    let notifier_timeout_ms: Option<u64> = get_setting(db, "notifier_timeout_ms").await?;
    let outbox_capacity: Option<usize> = get_setting(db, "outbox_capacity").await?;

    Ok(EngineSettings {
        store_timeout: store_timeout_ms
            .map(millis_to_duration)
            .unwrap_or(defaults.store_timeout),
        max_lock_wait_ms: max_lock_wait_ms.unwrap_or(defaults.max_lock_wait_ms),
        reconcile_max_attempts: max_attempts
            .filter(|n| *n > 0)
            .unwrap_or(defaults.reconcile_max_attempts),
        notifier_timeout: notifier_timeout_ms
            .map(millis_to_duration)
            .unwrap_or(defaults.notifier_timeout),
        outbox_capacity: outbox_capacity
            .filter(|n| *n > 0)
            .unwrap_or(defaults.outbox_capacity),
    })
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await
            .map_err(Error::Database)?;

    match row {
        Some((Some(value),)) => {
            let parsed = value
                .trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
