//! Tests for database initialization
//!
//! First run creates the file, schema and default settings; later runs open
//! the same file without touching stored data.

use staysync_common::db::init::init_database;
use staysync_common::db::{get_schema_version, get_setting, load_engine_settings, set_setting};
use staysync_common::db::CURRENT_SCHEMA_VERSION;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("staysync.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing_and_keeps_settings() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("staysync.db");

    let pool = init_database(&db_path).await.unwrap();
    set_setting(&pool, "outbox_capacity", 16).await.unwrap();
    pool.close().await;

    // Second open must not reset operator-tuned values
    let pool = init_database(&db_path).await.unwrap();
    let capacity: Option<usize> = get_setting(&pool, "outbox_capacity").await.unwrap();
    assert_eq!(capacity, Some(16));
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("staysync.db"))
        .await
        .unwrap();

    for key in [
        "store_timeout_ms",
        "db_lock_retry_ms",
        "db_max_lock_wait_ms",
        "reconcile_max_attempts",
        "notifier_timeout_ms",
        "outbox_capacity",
    ] {
        let value: Option<String> = get_setting(&pool, key).await.unwrap();
        assert!(value.is_some(), "Setting {} missing", key);
    }

    let settings = load_engine_settings(&pool).await.unwrap();
    assert_eq!(settings, staysync_common::db::EngineSettings::default());
}

#[tokio::test]
async fn test_schema_is_current_and_enforces_partition_agreement() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("staysync.db"))
        .await
        .unwrap();

    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);

    // A canceled flag in the active partition violates the table CHECK
    let result = sqlx::query(
        "INSERT INTO reservations (
            tenant_id, id, partition, channel, check_in, check_out, booked_at,
            status, payment_status, payment_method, is_canceled, created_at, updated_at
         ) VALUES ('h1', 'Agoda-1', 'active', 'Agoda', '2024-01-01 15:00:00',
            '2024-01-02 11:00:00', '2024-01-01 10:00:00', 'Canceled', 'unconfirmed',
            'ChannelBilled', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());
}
