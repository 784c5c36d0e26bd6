//! Front-desk operation tests over reconciled data

mod helpers;

use helpers::{raw, test_reconciler, TestHarness};
use serde_json::json;
use staysync_common::config::EngineConfig;
use staysync_common::{Error, Partition, PaymentMethod};
use staysync_recon::operations::{
    confirm_reservation, delete_reservation, list_active, list_canceled, update_reservation,
    ReservationPatch,
};
use staysync_recon::store::ReservationStore;

async fn seeded() -> TestHarness {
    let h = test_reconciler().await;
    let records = vec![
        raw(json!({
            "reservationNo": "OP-1",
            "customerName": "Kim Jisoo",
            "checkIn": "2024-08-01 15:00",
            "checkOut": "2024-08-02 11:00",
            "price": "100,000"
        })),
        raw(json!({
            "reservationNo": "OP-2",
            "customerName": "kim jisoo",
            "checkIn": "2024-08-03 15:00",
            "checkOut": "2024-08-04 11:00",
            "price": "120,000"
        })),
        raw(json!({
            "reservationNo": "OP-3",
            "customerName": "Yoon",
            "checkIn": "2024-08-05 15:00",
            "checkOut": "2024-08-06 11:00",
            "reservationStatus": "Cancelled"
        })),
    ];
    h.reconciler.reconcile("hotel-a", "Agoda", &records).await.unwrap();
    h
}

#[tokio::test]
async fn test_list_by_customer_name_is_case_insensitive() {
    let h = seeded().await;

    let all = list_active(h.store.as_ref(), "hotel-a", None).await.unwrap();
    assert_eq!(all.len(), 2);

    let by_name = list_active(h.store.as_ref(), "hotel-a", Some("KIM JISOO"))
        .await
        .unwrap();
    assert_eq!(by_name.len(), 2);

    let nobody = list_active(h.store.as_ref(), "hotel-a", Some("Park"))
        .await
        .unwrap();
    assert!(nobody.is_empty());

    let canceled = list_canceled(h.store.as_ref(), "hotel-a").await.unwrap();
    assert_eq!(canceled.len(), 1);
    assert_eq!(canceled[0].record.id, "Agoda-OP-3");
}

#[tokio::test]
async fn test_confirm_twice_conflicts() {
    let h = seeded().await;

    let confirmed = confirm_reservation(h.store.as_ref(), "hotel-a", "Agoda-OP-1")
        .await
        .unwrap();
    assert_eq!(confirmed.record.status, "confirmed");
    assert_eq!(confirmed.version, 2);

    let again = confirm_reservation(h.store.as_ref(), "hotel-a", "Agoda-OP-1").await;
    assert!(matches!(again, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn test_confirm_canceled_reservation_not_found() {
    let h = seeded().await;
    let result = confirm_reservation(h.store.as_ref(), "hotel-a", "Agoda-OP-3").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_update_normalizes_patch_values() {
    let h = seeded().await;
    let patch: ReservationPatch = serde_json::from_value(json!({
        "phoneNumber": "010 9999 0000",
        "price": "₩95,500",
        "checkOut": "2024-08-03",
        "paymentMethod": "Cash"
    }))
    .unwrap();

    let updated = update_reservation(
        h.store.as_ref(),
        &EngineConfig::default(),
        "hotel-a",
        "Agoda-OP-1",
        &patch,
    )
    .await
    .unwrap();

    assert_eq!(updated.partition, Partition::Active);
    assert_eq!(updated.record.phone_number, "01099990000");
    assert_eq!(updated.record.price, 95500);
    assert_eq!(
        updated.record.check_out.format("%Y-%m-%d %H:%M").to_string(),
        "2024-08-03 11:00"
    );
    // OTA reservations stay channel-billed whatever the front desk types
    assert_eq!(updated.record.payment_method, PaymentMethod::ChannelBilled);
    assert_eq!(updated.record.customer_name, "Kim Jisoo");
}

#[tokio::test]
async fn test_update_rejects_inverted_stay() {
    let h = seeded().await;
    let patch = ReservationPatch {
        check_in: Some("2024-08-10 15:00".to_string()),
        ..Default::default()
    };

    let result = update_reservation(
        h.store.as_ref(),
        &EngineConfig::default(),
        "hotel-a",
        "Agoda-OP-1",
        &patch,
    )
    .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    let stored = h.store.get("hotel-a", "Agoda-OP-1").await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn test_delete_from_each_partition() {
    let h = seeded().await;

    delete_reservation(h.store.as_ref(), "hotel-a", Partition::Active, "Agoda-OP-2")
        .await
        .unwrap();
    assert!(h.store.get("hotel-a", "Agoda-OP-2").await.unwrap().is_none());

    // Wrong partition leaves the record alone
    let wrong = delete_reservation(h.store.as_ref(), "hotel-a", Partition::Active, "Agoda-OP-3").await;
    assert!(matches!(wrong, Err(Error::NotFound(_))));

    delete_reservation(h.store.as_ref(), "hotel-a", Partition::Canceled, "Agoda-OP-3")
        .await
        .unwrap();
    assert_eq!(h.count("hotel-a").await, 1);
}

#[tokio::test]
async fn test_deleted_reservation_returns_on_next_ingestion() {
    let h = seeded().await;
    delete_reservation(h.store.as_ref(), "hotel-a", Partition::Active, "Agoda-OP-1")
        .await
        .unwrap();

    let summary = h
        .reconciler
        .reconcile(
            "hotel-a",
            "Agoda",
            &[raw(json!({
                "reservationNo": "OP-1",
                "checkIn": "2024-08-01 15:00",
                "checkOut": "2024-08-02 11:00"
            }))],
        )
        .await
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(h.partition_of("hotel-a", "Agoda-OP-1").await, Some(Partition::Active));
}
