//! Integration tests for overlapping ingestion runs
//!
//! Several batches for the same tenant race on the same reservation ids.
//! Whatever the interleaving, each id must end up in exactly one partition
//! and that partition must agree with the stored verdict.

mod helpers;

use helpers::{create_test_db, raw};
use serde_json::json;
use staysync_common::config::EngineConfig;
use staysync_common::Partition;
use staysync_recon::classifier::KeywordClassifier;
use staysync_recon::store::SqliteReservationStore;
use staysync_recon::tenants::SqliteTenantDirectory;
use staysync_recon::{BatchReconciler, RawRecord};
use std::sync::Arc;
use tokio::task::JoinSet;

fn batch(status: &str, count: usize) -> Vec<RawRecord> {
    (0..count)
        .map(|i| {
            raw(json!({
                "reservationNo": format!("R-{:03}", i),
                "customerName": format!("Guest {}", i),
                "checkIn": "2024-07-01 15:00",
                "checkOut": "2024-07-02 11:00",
                "reservationDate": "2024-06-20 10:00",
                "reservationStatus": status,
                "price": 80000
            }))
        })
        .collect()
}

async fn shared_reconciler() -> (tempfile::TempDir, sqlx::SqlitePool, Arc<BatchReconciler>) {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    let reconciler = BatchReconciler::new(
        Arc::new(SqliteReservationStore::new(pool.clone(), 10_000)),
        Arc::new(SqliteTenantDirectory::new(pool.clone(), true, 10_000)),
        Arc::new(KeywordClassifier::default()),
        EngineConfig::default(),
    )
    .unwrap();
    (temp_dir, pool, Arc::new(reconciler))
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test]
async fn test_overlapping_batches_keep_one_row_per_id() {
    let (_temp_dir, pool, reconciler) = shared_reconciler().await;
    const RECORDS: usize = 25;

    let mut join_set = JoinSet::new();
    for task in 0..6 {
        let reconciler = Arc::clone(&reconciler);
        let status = if task % 2 == 0 { "Confirmed" } else { "Canceled" };
        join_set.spawn(async move {
            let summary = reconciler
                .reconcile("hotel-race", "Agoda", &batch(status, RECORDS))
                .await
                .expect("batch-level failure");
            (task, summary)
        });
    }

    let mut finished = Vec::new();
    while let Some(result) = join_set.join_next().await {
        let (task, summary) = result.expect("Task panicked");
        assert_eq!(
            summary.processed + summary.skipped.len(),
            RECORDS,
            "task {} lost records",
            task
        );
        finished.push(task);
    }
    finished.sort();
    assert_eq!(finished, vec![0, 1, 2, 3, 4, 5]);

    let rows: Vec<(String, String, bool)> = sqlx::query_as(
        "SELECT id, partition, is_canceled FROM reservations WHERE tenant_id = ? ORDER BY id",
    )
    .bind("hotel-race")
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(rows.len(), RECORDS);
    for (id, partition, is_canceled) in rows {
        let partition = Partition::parse(&partition).unwrap();
        assert_eq!(
            partition,
            Partition::for_verdict(is_canceled),
            "{} stored in {} with is_canceled={}",
            id,
            partition,
            is_canceled
        );
    }
}

#[tokio::test]
async fn test_first_ingestion_of_new_tenant_from_many_tasks() {
    let (_temp_dir, pool, reconciler) = shared_reconciler().await;

    let mut join_set = JoinSet::new();
    for task in 0..8 {
        let reconciler = Arc::clone(&reconciler);
        join_set.spawn(async move {
            let records = vec![raw(json!({
                "reservationNo": format!("T-{}", task),
                "checkIn": "2024-07-01",
                "checkOut": "2024-07-02"
            }))];
            reconciler
                .reconcile("hotel-new", "Booking", &records)
                .await
                .map(|s| s.processed)
        });
    }

    let mut processed = 0;
    while let Some(result) = join_set.join_next().await {
        processed += result.expect("Task panicked").expect("provisioning raced");
    }
    assert_eq!(processed, 8);

    let tenants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants WHERE tenant_id = ?")
        .bind("hotel-new")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(tenants, 1);
}

#[tokio::test]
async fn test_parallel_tenants_do_not_interfere() {
    let (_temp_dir, pool, reconciler) = shared_reconciler().await;

    let mut join_set = JoinSet::new();
    for tenant in ["hotel-1", "hotel-2", "hotel-3"] {
        let reconciler = Arc::clone(&reconciler);
        let status = if tenant == "hotel-2" { "취소" } else { "Confirmed" };
        join_set.spawn(async move {
            reconciler
                .reconcile(tenant, "Yanolja", &batch(status, 10))
                .await
                .expect("batch-level failure")
        });
    }
    while let Some(result) = join_set.join_next().await {
        result.expect("Task panicked");
    }

    for (tenant, expected) in [
        ("hotel-1", Partition::Active),
        ("hotel-2", Partition::Canceled),
        ("hotel-3", Partition::Active),
    ] {
        let partitions: Vec<String> =
            sqlx::query_scalar("SELECT partition FROM reservations WHERE tenant_id = ?")
                .bind(tenant)
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(partitions.len(), 10, "{}", tenant);
        assert!(partitions.iter().all(|p| p == expected.as_str()), "{}", tenant);
    }
}
