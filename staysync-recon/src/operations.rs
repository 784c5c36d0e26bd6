//! Operator operations on stored reservations
//!
//! Front-desk actions that happen outside ingestion: browsing, confirming a
//! pending reservation, correcting fields and removing a reservation. Every
//! write is conditional on the version read, like the reconciler's, so an
//! edit racing an ingestion run fails cleanly instead of clobbering it.

use crate::dates::parse_timestamp;
use crate::normalize::{
    normalize_check_out, normalize_phone, normalize_price, resolve_payment_method,
};
use crate::store::{ListFilter, ReservationStore};
use serde::Deserialize;
use serde_json::Value;
use staysync_common::config::EngineConfig;
use staysync_common::db::models::StoredReservation;
use staysync_common::{Error, Partition, Result};
use tracing::info;

const CONFIRMED: &str = "confirmed";

/// Active reservations, newest first, optionally by exact customer name
pub async fn list_active(
    store: &dyn ReservationStore,
    tenant_id: &str,
    customer_name: Option<&str>,
) -> Result<Vec<StoredReservation>> {
    let filter = ListFilter {
        customer_name: customer_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string),
        limit: None,
    };
    store.list(tenant_id, Partition::Active, &filter).await
}

pub async fn list_canceled(
    store: &dyn ReservationStore,
    tenant_id: &str,
) -> Result<Vec<StoredReservation>> {
    store
        .list(tenant_id, Partition::Canceled, &ListFilter::default())
        .await
}

/// Mark an active reservation as confirmed
pub async fn confirm_reservation(
    store: &dyn ReservationStore,
    tenant_id: &str,
    id: &str,
) -> Result<StoredReservation> {
    let stored = store
        .get_in(tenant_id, Partition::Active, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Active reservation {}", id)))?;

    if stored.record.status == CONFIRMED {
        return Err(Error::Conflict(format!("Reservation {} is already confirmed", id)));
    }

    let mut record = stored.record.clone();
    record.status = CONFIRMED.to_string();

    write_back(store, tenant_id, &stored, &record).await?;
    info!(tenant_id, id, "Reservation confirmed");
    reread(store, tenant_id, id).await
}

/// Field corrections from the front desk
///
/// Absent fields are left unchanged. Values go through the same
/// normalization as ingested records.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReservationPatch {
    pub customer_name: Option<String>,
    pub phone_number: Option<String>,
    pub room_description: Option<String>,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub booked_at: Option<String>,
    pub status: Option<String>,
    pub price: Option<Value>,
    pub additional_fees: Option<Value>,
    pub special_requests: Option<String>,
    pub coupon_info: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
}

/// Apply a patch to an active reservation
///
/// The cancellation verdict is not re-evaluated; edits never move a
/// reservation between partitions.
pub async fn update_reservation(
    store: &dyn ReservationStore,
    engine: &EngineConfig,
    tenant_id: &str,
    id: &str,
    patch: &ReservationPatch,
) -> Result<StoredReservation> {
    let stored = store
        .get_in(tenant_id, Partition::Active, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Active reservation {}", id)))?;

    let mut record = stored.record.clone();

    if let Some(name) = &patch.customer_name {
        record.customer_name = name.trim().to_string();
    }
    if let Some(phone) = &patch.phone_number {
        record.phone_number = normalize_phone(Some(phone.as_str()));
    }
    if let Some(room) = &patch.room_description {
        record.room_description = room.trim().to_string();
    }
    if let Some(raw) = &patch.check_in {
        record.check_in = parse_field("checkIn", raw)?;
    }
    if let Some(raw) = &patch.check_out {
        let with_time = normalize_check_out(raw, engine.checkout_time()?);
        record.check_out = parse_field("checkOut", &with_time)?;
    }
    if let Some(raw) = &patch.booked_at {
        record.booked_at = parse_field("bookedAt", raw)?;
    }
    if let Some(status) = &patch.status {
        record.status = status.trim().to_string();
    }
    if let Some(price) = &patch.price {
        record.price = normalize_price(Some(price));
    }
    if let Some(fees) = &patch.additional_fees {
        record.additional_fees = normalize_price(Some(fees));
    }
    if let Some(requests) = &patch.special_requests {
        record.special_requests = Some(requests.clone()).filter(|s| !s.trim().is_empty());
    }
    if let Some(coupon) = &patch.coupon_info {
        record.coupon_info = Some(coupon.clone()).filter(|s| !s.trim().is_empty());
    }
    if let Some(payment_status) = &patch.payment_status {
        record.payment_status = payment_status.trim().to_string();
    }
    record.payment_method = match &patch.payment_method {
        Some(label) => resolve_payment_method(&record.channel, Some(label.as_str()), engine),
        None if engine.is_ota(&record.channel) => {
            resolve_payment_method(&record.channel, None, engine)
        }
        None => record.payment_method,
    };

    if record.check_in >= record.check_out {
        return Err(Error::InvalidInput(format!(
            "check-in {} is not before check-out {}",
            record.check_in, record.check_out
        )));
    }

    write_back(store, tenant_id, &stored, &record).await?;
    info!(tenant_id, id, "Reservation updated");
    reread(store, tenant_id, id).await
}

/// Remove a reservation from the given partition
pub async fn delete_reservation(
    store: &dyn ReservationStore,
    tenant_id: &str,
    partition: Partition,
    id: &str,
) -> Result<()> {
    if store.delete(tenant_id, partition, id).await? {
        info!(tenant_id, id, %partition, "Reservation deleted");
        Ok(())
    } else {
        Err(Error::NotFound(format!("Reservation {} in {} partition", id, partition)))
    }
}

fn parse_field(field: &str, raw: &str) -> Result<chrono::NaiveDateTime> {
    parse_timestamp(raw)
        .ok_or_else(|| Error::InvalidInput(format!("{} '{}' is not a recognizable date", field, raw)))
}

async fn write_back(
    store: &dyn ReservationStore,
    tenant_id: &str,
    stored: &StoredReservation,
    record: &staysync_common::ReservationRecord,
) -> Result<()> {
    let written = store
        .overwrite(tenant_id, stored.partition, record, stored.version)
        .await?;
    if !written {
        return Err(Error::Conflict(format!(
            "Reservation {} changed while it was being edited",
            record.id
        )));
    }
    Ok(())
}

async fn reread(store: &dyn ReservationStore, tenant_id: &str, id: &str) -> Result<StoredReservation> {
    store
        .get(tenant_id, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Reservation {}", id)))
}
