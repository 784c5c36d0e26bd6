//! SQLite-backed reservation store

use super::{check_record, ListFilter, ReservationStore};
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use staysync_common::db::models::StoredReservation;
use staysync_common::time::{from_storage, to_storage};
use staysync_common::{Error, Partition, PaymentMethod, ReservationRecord, Result};
use tracing::debug;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

const SELECT_COLUMNS: &str = "tenant_id, id, partition, channel, customer_name, phone_number, \
     room_description, check_in, check_out, booked_at, status, price, special_requests, \
     coupon_info, additional_fees, payment_status, payment_method, is_canceled, extra, \
     version, created_at, updated_at";

const INSERT_SQL: &str = r#"
    INSERT INTO reservations (
        channel, customer_name, phone_number, room_description, check_in, check_out,
        booked_at, status, price, special_requests, coupon_info, additional_fees,
        payment_status, payment_method, is_canceled, extra,
        tenant_id, id, partition, version, created_at, updated_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
    ON CONFLICT (tenant_id, id) DO NOTHING
"#;

const CONDITIONAL_UPDATE_SQL: &str = r#"
    UPDATE reservations SET
        channel = ?, customer_name = ?, phone_number = ?, room_description = ?,
        check_in = ?, check_out = ?, booked_at = ?, status = ?, price = ?,
        special_requests = ?, coupon_info = ?, additional_fees = ?,
        payment_status = ?, payment_method = ?, is_canceled = ?, extra = ?,
        partition = ?, version = version + 1, updated_at = ?
    WHERE tenant_id = ? AND id = ? AND partition = ? AND version = ?
"#;

/// Reservation store over the shared `reservations` table
#[derive(Clone)]
pub struct SqliteReservationStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteReservationStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn conditional_update(
        &self,
        operation: &'static str,
        tenant_id: &str,
        from: Partition,
        to: Partition,
        record: &ReservationRecord,
        expected_version: i64,
    ) -> Result<bool> {
        check_record(tenant_id, to, record)?;
        let columns = RecordColumns::from_record(record)?;

        let updated = retry_on_lock(operation, self.max_lock_wait_ms, || {
            let pool = self.pool.clone();
            let columns = columns.clone();
            let tenant_id = tenant_id.to_string();
            let id = record.id.clone();
            async move {
                let result = columns
                    .bind(sqlx::query(CONDITIONAL_UPDATE_SQL))
                    .bind(to.as_str())
                    .bind(storage_timestamp(Utc::now()))
                    .bind(tenant_id)
                    .bind(id)
                    .bind(from.as_str())
                    .bind(expected_version)
                    .execute(&pool)
                    .await
                    .map_err(Error::Database)?;
                Ok::<bool, Error>(result.rows_affected() == 1)
            }
        })
        .await?;

        debug!(
            tenant_id,
            id = %record.id,
            %from,
            %to,
            expected_version,
            updated,
            "Conditional reservation update"
        );
        Ok(updated)
    }
}

#[async_trait]
impl ReservationStore for SqliteReservationStore {
    async fn provision(&self, tenant_id: &str) -> Result<()> {
        // Partitions are rows of the shared table; only the table must exist
        staysync_common::db::create_reservations_table(&self.pool).await?;
        debug!(tenant_id, "Reservation partitions ready");
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<StoredReservation>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE tenant_id = ? AND id = ?",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_stored).transpose()
    }

    async fn get_in(
        &self,
        tenant_id: &str,
        partition: Partition,
        id: &str,
    ) -> Result<Option<StoredReservation>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE tenant_id = ? AND id = ? AND partition = ?",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(id)
            .bind(partition.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_stored).transpose()
    }

    async fn insert(
        &self,
        tenant_id: &str,
        partition: Partition,
        record: &ReservationRecord,
    ) -> Result<bool> {
        check_record(tenant_id, partition, record)?;
        let columns = RecordColumns::from_record(record)?;

        let inserted = retry_on_lock("reservation insert", self.max_lock_wait_ms, || {
            let pool = self.pool.clone();
            let columns = columns.clone();
            let tenant_id = tenant_id.to_string();
            let id = record.id.clone();
            async move {
                let now = storage_timestamp(Utc::now());
                let result = columns
                    .bind(sqlx::query(INSERT_SQL))
                    .bind(tenant_id)
                    .bind(id)
                    .bind(partition.as_str())
                    .bind(now.clone())
                    .bind(now)
                    .execute(&pool)
                    .await
                    .map_err(Error::Database)?;
                Ok::<bool, Error>(result.rows_affected() == 1)
            }
        })
        .await?;

        debug!(tenant_id, id = %record.id, %partition, inserted, "Reservation insert");
        Ok(inserted)
    }

    async fn overwrite(
        &self,
        tenant_id: &str,
        partition: Partition,
        record: &ReservationRecord,
        expected_version: i64,
    ) -> Result<bool> {
        self.conditional_update(
            "reservation overwrite",
            tenant_id,
            partition,
            partition,
            record,
            expected_version,
        )
        .await
    }

    async fn move_to(
        &self,
        tenant_id: &str,
        from: Partition,
        to: Partition,
        record: &ReservationRecord,
        expected_version: i64,
    ) -> Result<bool> {
        self.conditional_update(
            "reservation move",
            tenant_id,
            from,
            to,
            record,
            expected_version,
        )
        .await
    }

    async fn delete(&self, tenant_id: &str, partition: Partition, id: &str) -> Result<bool> {
        let deleted = retry_on_lock("reservation delete", self.max_lock_wait_ms, || {
            let pool = self.pool.clone();
            let tenant_id = tenant_id.to_string();
            let id = id.to_string();
            async move {
                let result = sqlx::query(
                    "DELETE FROM reservations WHERE tenant_id = ? AND id = ? AND partition = ?",
                )
                .bind(tenant_id)
                .bind(id)
                .bind(partition.as_str())
                .execute(&pool)
                .await
                .map_err(Error::Database)?;
                Ok::<bool, Error>(result.rows_affected() == 1)
            }
        })
        .await?;

        debug!(tenant_id, id, %partition, deleted, "Reservation delete");
        Ok(deleted)
    }

    async fn list(
        &self,
        tenant_id: &str,
        partition: Partition,
        filter: &ListFilter,
    ) -> Result<Vec<StoredReservation>> {
        // LIMIT -1 is unbounded in SQLite
        let sql = format!(
            "SELECT {} FROM reservations
             WHERE tenant_id = ? AND partition = ?
               AND (? IS NULL OR customer_name = ? COLLATE NOCASE)
             ORDER BY created_at DESC, id ASC
             LIMIT ?",
            SELECT_COLUMNS
        );
        let name = filter.customer_name.as_deref().map(str::trim);
        let limit = filter.limit.map(i64::from).unwrap_or(-1);

        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(partition.as_str())
            .bind(name)
            .bind(name)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_stored).collect()
    }
}

/// Owned column values shared by INSERT and UPDATE, in statement order
#[derive(Clone)]
struct RecordColumns {
    channel: String,
    customer_name: String,
    phone_number: String,
    room_description: String,
    check_in: String,
    check_out: String,
    booked_at: String,
    status: String,
    price: i64,
    special_requests: Option<String>,
    coupon_info: Option<String>,
    additional_fees: i64,
    payment_status: String,
    payment_method: &'static str,
    is_canceled: bool,
    extra: String,
}

impl RecordColumns {
    fn from_record(record: &ReservationRecord) -> Result<Self> {
        Ok(Self {
            channel: record.channel.clone(),
            customer_name: record.customer_name.clone(),
            phone_number: record.phone_number.clone(),
            room_description: record.room_description.clone(),
            check_in: to_storage(&record.check_in),
            check_out: to_storage(&record.check_out),
            booked_at: to_storage(&record.booked_at),
            status: record.status.clone(),
            price: record.price,
            special_requests: record.special_requests.clone(),
            coupon_info: record.coupon_info.clone(),
            additional_fees: record.additional_fees,
            payment_status: record.payment_status.clone(),
            payment_method: record.payment_method.as_str(),
            is_canceled: record.is_canceled,
            extra: serde_json::to_string(&record.extra)?,
        })
    }

    fn bind(self, query: SqliteQuery<'static>) -> SqliteQuery<'static> {
        query
            .bind(self.channel)
            .bind(self.customer_name)
            .bind(self.phone_number)
            .bind(self.room_description)
            .bind(self.check_in)
            .bind(self.check_out)
            .bind(self.booked_at)
            .bind(self.status)
            .bind(self.price)
            .bind(self.special_requests)
            .bind(self.coupon_info)
            .bind(self.additional_fees)
            .bind(self.payment_status)
            .bind(self.payment_method)
            .bind(self.is_canceled)
            .bind(self.extra)
    }
}

fn storage_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_stored(row: &SqliteRow) -> Result<StoredReservation> {
    let id: String = row.try_get("id")?;

    let naive = |column: &str| -> Result<chrono::NaiveDateTime> {
        let raw: String = row.try_get(column)?;
        from_storage(&raw).ok_or_else(|| {
            Error::Internal(format!("reservation {} has malformed {}: '{}'", id, column, raw))
        })
    };
    let utc = |column: &str| -> Result<DateTime<Utc>> {
        let raw: String = row.try_get(column)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                Error::Internal(format!("reservation {} has malformed {}: {}", id, column, e))
            })
    };

    let partition_raw: String = row.try_get("partition")?;
    let partition = Partition::parse(&partition_raw).ok_or_else(|| {
        Error::Internal(format!("reservation {} has unknown partition '{}'", id, partition_raw))
    })?;

    let method_raw: String = row.try_get("payment_method")?;
    let payment_method = PaymentMethod::parse_label(&method_raw).ok_or_else(|| {
        Error::Internal(format!(
            "reservation {} has unknown payment method '{}'",
            id, method_raw
        ))
    })?;

    let extra_raw: String = row.try_get("extra")?;
    let extra = serde_json::from_str(&extra_raw)?;

    let record = ReservationRecord {
        id: id.clone(),
        tenant_id: row.try_get("tenant_id")?,
        channel: row.try_get("channel")?,
        customer_name: row.try_get("customer_name")?,
        phone_number: row.try_get("phone_number")?,
        room_description: row.try_get("room_description")?,
        check_in: naive("check_in")?,
        check_out: naive("check_out")?,
        booked_at: naive("booked_at")?,
        status: row.try_get("status")?,
        price: row.try_get("price")?,
        special_requests: row.try_get("special_requests")?,
        coupon_info: row.try_get("coupon_info")?,
        additional_fees: row.try_get("additional_fees")?,
        payment_status: row.try_get("payment_status")?,
        payment_method,
        is_canceled: row.try_get("is_canceled")?,
        extra,
    };

    Ok(StoredReservation {
        partition,
        version: row.try_get("version")?,
        created_at: utc("created_at")?,
        updated_at: utc("updated_at")?,
        record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_store() -> SqliteReservationStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        staysync_common::db::create_schema(&pool).await.unwrap();
        SqliteReservationStore::new(pool, 1000)
    }

    fn record(id: &str, canceled: bool) -> ReservationRecord {
        let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let mut extra = serde_json::Map::new();
        extra.insert("guestCount".to_string(), json!(2));
        ReservationRecord {
            id: id.to_string(),
            tenant_id: "h1".to_string(),
            channel: "Agoda".to_string(),
            customer_name: "Kim".to_string(),
            phone_number: "01012345678".to_string(),
            room_description: "Deluxe".to_string(),
            check_in: day.and_hms_opt(15, 0, 0).unwrap(),
            check_out: day.succ_opt().unwrap().and_hms_opt(11, 0, 0).unwrap(),
            booked_at: day.and_hms_opt(9, 30, 0).unwrap(),
            status: "confirmed".to_string(),
            price: 120000,
            special_requests: Some("late arrival".to_string()),
            coupon_info: None,
            additional_fees: 0,
            payment_status: "unconfirmed".to_string(),
            payment_method: PaymentMethod::ChannelBilled,
            is_canceled: canceled,
            extra,
        }
    }

    #[tokio::test]
    async fn test_insert_then_get_preserves_fields() {
        let store = setup_store().await;
        let rec = record("Agoda-1", false);

        assert!(store.insert("h1", Partition::Active, &rec).await.unwrap());
        let stored = store.get("h1", "Agoda-1").await.unwrap().unwrap();

        assert_eq!(stored.partition, Partition::Active);
        assert_eq!(stored.version, 1);
        assert_eq!(stored.record, rec);
    }

    #[tokio::test]
    async fn test_insert_existing_id_returns_false() {
        let store = setup_store().await;
        assert!(store.insert("h1", Partition::Active, &record("Agoda-1", false)).await.unwrap());
        // Same id, other partition: still refused
        assert!(!store
            .insert("h1", Partition::Canceled, &record("Agoda-1", true))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_requires_matching_version() {
        let store = setup_store().await;
        let mut rec = record("Agoda-1", false);
        store.insert("h1", Partition::Active, &rec).await.unwrap();

        rec.price = 99000;
        assert!(!store.overwrite("h1", Partition::Active, &rec, 7).await.unwrap());
        assert!(store.overwrite("h1", Partition::Active, &rec, 1).await.unwrap());

        let stored = store.get("h1", "Agoda-1").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.record.price, 99000);
    }

    #[tokio::test]
    async fn test_move_changes_partition_atomically() {
        let store = setup_store().await;
        store.insert("h1", Partition::Active, &record("Agoda-1", false)).await.unwrap();

        let canceled = record("Agoda-1", true);
        assert!(store
            .move_to("h1", Partition::Active, Partition::Canceled, &canceled, 1)
            .await
            .unwrap());

        assert!(store.get_in("h1", Partition::Active, "Agoda-1").await.unwrap().is_none());
        let stored = store.get_in("h1", Partition::Canceled, "Agoda-1").await.unwrap().unwrap();
        assert!(stored.record.is_canceled);
    }

    #[tokio::test]
    async fn test_partition_must_agree_with_verdict() {
        let store = setup_store().await;
        let result = store.insert("h1", Partition::Canceled, &record("Agoda-1", false)).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_tenant_mismatch_rejected() {
        let store = setup_store().await;
        let result = store.insert("h2", Partition::Active, &record("Agoda-1", false)).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_list_filters_by_name_case_insensitively() {
        let store = setup_store().await;
        let mut a = record("Agoda-1", false);
        a.customer_name = "John Smith".to_string();
        let mut b = record("Agoda-2", false);
        b.customer_name = "Jane Doe".to_string();
        store.insert("h1", Partition::Active, &a).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.insert("h1", Partition::Active, &b).await.unwrap();

        let all = store.list("h1", Partition::Active, &ListFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        // Newest first
        assert_eq!(all[0].record.id, "Agoda-2");

        let smiths = store
            .list("h1", Partition::Active, &ListFilter::by_name("john smith"))
            .await
            .unwrap();
        assert_eq!(smiths.len(), 1);
        assert_eq!(smiths[0].record.id, "Agoda-1");

        let partial = store
            .list("h1", Partition::Active, &ListFilter::by_name("john"))
            .await
            .unwrap();
        assert!(partial.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = setup_store().await;
        store.insert("h1", Partition::Active, &record("Agoda-1", false)).await.unwrap();

        assert!(!store.delete("h1", Partition::Canceled, "Agoda-1").await.unwrap());
        assert!(store.delete("h1", Partition::Active, "Agoda-1").await.unwrap());
        assert!(store.get("h1", "Agoda-1").await.unwrap().is_none());
    }
}
