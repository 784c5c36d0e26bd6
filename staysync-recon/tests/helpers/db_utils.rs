//! Database Test Utilities

use super::doubles::RecordingNotifier;
use anyhow::Result;
use serde_json::Value;
use sqlx::SqlitePool;
use staysync_common::config::EngineConfig;
use staysync_common::db::{init_database, EngineSettings};
use staysync_common::events::EventBus;
use staysync_recon::classifier::KeywordClassifier;
use staysync_recon::notify::outbox::outbox_channel;
use staysync_recon::notify::OutboxWorker;
use staysync_recon::runs::RunLedger;
use staysync_recon::store::{ReservationStore, SqliteReservationStore};
use staysync_recon::tenants::SqliteTenantDirectory;
use staysync_recon::{BatchReconciler, RawRecord};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Create temporary test database with schema and default settings
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_staysync.db");
    let pool = init_database(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Raw record from JSON
pub fn raw(value: Value) -> RawRecord {
    serde_json::from_value(value).expect("test record must deserialize")
}

/// Everything a reconciliation test needs to look at
pub struct TestHarness {
    pub _temp_dir: TempDir,
    pub pool: SqlitePool,
    pub store: Arc<SqliteReservationStore>,
    pub reconciler: BatchReconciler,
    pub notifier: Arc<RecordingNotifier>,
    pub worker: OutboxWorker,
    pub ledger: RunLedger,
    pub events: EventBus,
}

impl TestHarness {
    /// Deliver queued notifications and return how many were sent
    pub async fn deliver_notifications(&mut self) -> usize {
        self.worker.drain().await;
        self.notifier.sent().len()
    }

    pub async fn partition_of(&self, tenant_id: &str, id: &str) -> Option<staysync_common::Partition> {
        self.store
            .get(tenant_id, id)
            .await
            .unwrap()
            .map(|stored| stored.partition)
    }

    pub async fn count(&self, tenant_id: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM reservations WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

/// Reconciler over a fresh database with a recording notifier
pub async fn test_reconciler() -> TestHarness {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteReservationStore::new(pool.clone(), 5000));
    let directory = Arc::new(SqliteTenantDirectory::new(pool.clone(), true, 5000));
    let ledger = RunLedger::new(pool.clone(), 5000);
    let events = EventBus::new(256);
    let notifier = Arc::new(RecordingNotifier::default());
    let (outbox, worker) =
        outbox_channel(notifier.clone(), 64, Duration::from_secs(1), Some(events.clone()));

    let reconciler = BatchReconciler::new(
        store.clone(),
        directory,
        Arc::new(KeywordClassifier::default()),
        EngineConfig::default(),
    )
    .unwrap()
    .with_settings(EngineSettings::default())
    .with_outbox(outbox)
    .with_events(events.clone())
    .with_ledger(ledger.clone());

    TestHarness {
        _temp_dir: temp_dir,
        pool,
        store,
        reconciler,
        notifier,
        worker,
        ledger,
        events,
    }
}
