//! Batch reconciler
//!
//! Entry point for one scraped batch: one tenant, one channel, many raw
//! records. Each record is normalized, classified and reconciled on its own;
//! a rejected or failed record lands in the summary's skipped list and the
//! batch carries on. Only an unusable tenant fails the whole call.

use crate::classifier::CancellationClassifier;
use crate::dates::parse_timestamp;
use crate::error::{ReconError, ReconResult, Rejection, SkipReason};
use crate::normalize::{
    non_blank, normalize_check_out, normalize_phone, normalize_price, reservation_number,
    resolve_payment_method,
};
use crate::notify::{gate_blockers, onsite_request, NotificationOutbox};
use crate::runs::{RunLedger, RunResult, RunStatus};
use crate::state_machine::{apply, with_timeout, ApplyLimits, Transition};
use crate::store::ReservationStore;
use crate::tenants::TenantDirectory;
use crate::types::RawRecord;
use chrono::{NaiveDateTime, NaiveTime, SubsecRound};
use serde::Serialize;
use staysync_common::config::EngineConfig;
use staysync_common::db::models::TenantProfile;
use staysync_common::db::EngineSettings;
use staysync_common::events::{EventBus, ReconEvent, RecordOutcome};
use staysync_common::{ReservationRecord, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_STATUS: &str = "Pending";
const DEFAULT_PAYMENT_STATUS: &str = "unconfirmed";

/// A record that passed validation, ready for the state machine
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord {
    pub record: ReservationRecord,
    /// `booked_at` was missing upstream and set to the ingestion time
    pub booked_at_defaulted: bool,
}

/// A record written by this batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledRecord {
    pub index: usize,
    pub reservation_id: String,
    pub transition: Transition,
    pub outcome: RecordOutcome,
}

/// A record this batch did not write
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecord {
    /// Position in the input batch
    pub index: usize,
    pub reservation_no: Option<String>,
    pub reservation_id: Option<String>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub tenant_id: String,
    pub channel: String,
    pub processed: usize,
    pub reconciled: Vec<ReconciledRecord>,
    pub skipped: Vec<SkippedRecord>,
    pub notifications_queued: usize,
    /// Stopped early by the caller's cancellation token
    pub cancelled: bool,
}

pub struct BatchReconciler {
    store: Arc<dyn ReservationStore>,
    directory: Arc<dyn TenantDirectory>,
    classifier: Arc<dyn CancellationClassifier>,
    engine: EngineConfig,
    checkout_time: NaiveTime,
    settings: EngineSettings,
    template_id: String,
    outbox: Option<NotificationOutbox>,
    events: Option<EventBus>,
    ledger: Option<RunLedger>,
}

impl BatchReconciler {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        directory: Arc<dyn TenantDirectory>,
        classifier: Arc<dyn CancellationClassifier>,
        engine: EngineConfig,
    ) -> Result<Self> {
        let checkout_time = engine.checkout_time()?;
        Ok(Self {
            store,
            directory,
            classifier,
            engine,
            checkout_time,
            settings: EngineSettings::default(),
            template_id: staysync_common::config::NotifierConfig::default().template_id,
            outbox: None,
            events: None,
            ledger: None,
        })
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_template_id(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = template_id.into();
        self
    }

    pub fn with_outbox(mut self, outbox: NotificationOutbox) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_ledger(mut self, ledger: RunLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Reconcile a batch to completion
    pub async fn reconcile(
        &self,
        tenant_id: &str,
        channel: &str,
        records: &[RawRecord],
    ) -> ReconResult<BatchSummary> {
        self.reconcile_with_cancel(tenant_id, channel, records, &CancellationToken::new())
            .await
    }

    /// Reconcile a batch, stopping before the next record once `cancel` fires
    ///
    /// Writes already committed stay committed.
    pub async fn reconcile_with_cancel(
        &self,
        tenant_id: &str,
        channel: &str,
        records: &[RawRecord],
        cancel: &CancellationToken,
    ) -> ReconResult<BatchSummary> {
        let tenant_id = tenant_id.trim();
        let channel = channel.trim();
        if tenant_id.is_empty() {
            return Err(ReconError::InvalidBatch("tenant_id must not be blank".to_string()));
        }
        if channel.is_empty() {
            return Err(ReconError::InvalidBatch("channel must not be blank".to_string()));
        }

        let profile = self.provision(tenant_id).await?;

        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            tenant_id,
            channel,
            record_count = records.len(),
            "Reconciling batch"
        );
        self.start_run(run_id, tenant_id, channel, records.len()).await;
        self.emit(|| ReconEvent::BatchStarted {
            run_id,
            tenant_id: tenant_id.to_string(),
            channel: channel.to_string(),
            record_count: records.len(),
            timestamp: chrono::Utc::now(),
        });

        let limits = ApplyLimits {
            store_timeout: self.settings.store_timeout,
            max_attempts: self.settings.reconcile_max_attempts,
        };
        let ingested_at = staysync_common::time::local_now().trunc_subsecs(0);

        let mut summary = BatchSummary {
            run_id,
            tenant_id: tenant_id.to_string(),
            channel: channel.to_string(),
            processed: 0,
            reconciled: Vec::new(),
            skipped: Vec::new(),
            notifications_queued: 0,
            cancelled: false,
        };

        for (index, raw) in records.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    %run_id,
                    tenant_id,
                    remaining = records.len() - index,
                    "Batch cancelled, remaining records not processed"
                );
                summary.cancelled = true;
                break;
            }

            let reservation_no = reservation_number(raw.reservation_no.as_ref());

            let prepared = match self.prepare(tenant_id, channel, raw, ingested_at) {
                Ok(prepared) => prepared,
                Err(rejection) => {
                    warn!(
                        %run_id,
                        tenant_id,
                        index,
                        reservation_no = reservation_no.as_deref().unwrap_or(""),
                        reason = %rejection,
                        "Record rejected"
                    );
                    self.skip(
                        &mut summary,
                        index,
                        reservation_no,
                        None,
                        SkipReason::Rejected { rejection },
                    );
                    continue;
                }
            };

            let id = prepared.record.id.clone();
            match apply(
                self.store.as_ref(),
                tenant_id,
                &prepared.record,
                prepared.booked_at_defaulted,
                limits,
            )
            .await
            {
                Ok(applied) => {
                    let outcome = applied.transition.outcome();
                    summary.processed += 1;
                    summary.reconciled.push(ReconciledRecord {
                        index,
                        reservation_id: id.clone(),
                        transition: applied.transition,
                        outcome,
                    });
                    self.emit(|| ReconEvent::RecordReconciled {
                        run_id,
                        tenant_id: tenant_id.to_string(),
                        reservation_id: id,
                        outcome,
                        timestamp: chrono::Utc::now(),
                    });

                    if applied.transition.is_new_active() && self.notify(&applied.record, &profile)
                    {
                        summary.notifications_queued += 1;
                    }
                }
                Err(e) => {
                    error!(%run_id, tenant_id, id = %id, error = %e, "Record not persisted");
                    self.skip(
                        &mut summary,
                        index,
                        reservation_no,
                        Some(id),
                        SkipReason::StoreFailure {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        let status = if summary.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        self.finish_run(&summary, status).await;
        self.emit(|| ReconEvent::BatchCompleted {
            run_id,
            tenant_id: tenant_id.to_string(),
            channel: channel.to_string(),
            processed: summary.processed,
            skipped: summary.skipped.len(),
            cancelled: summary.cancelled,
            timestamp: chrono::Utc::now(),
        });

        info!(
            %run_id,
            tenant_id,
            channel,
            processed = summary.processed,
            skipped = summary.skipped.len(),
            notifications = summary.notifications_queued,
            cancelled = summary.cancelled,
            "Batch reconciled"
        );

        Ok(summary)
    }

    /// Normalize and classify one raw record
    pub fn prepare(
        &self,
        tenant_id: &str,
        channel: &str,
        raw: &RawRecord,
        ingested_at: NaiveDateTime,
    ) -> std::result::Result<PreparedRecord, Rejection> {
        let reservation_no = reservation_number(raw.reservation_no.as_ref())
            .ok_or(Rejection::MissingReservationNumber)?;

        if self
            .engine
            .sentinel_reservation_numbers
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(&reservation_no))
        {
            return Err(Rejection::SentinelReservationNumber {
                value: reservation_no,
            });
        }

        let check_in_raw = raw.check_in.as_deref().unwrap_or("");
        let check_in = parse_timestamp(check_in_raw).ok_or_else(|| Rejection::UnparseableCheckIn {
            raw: check_in_raw.to_string(),
        })?;

        let check_out_raw = raw.check_out.as_deref().unwrap_or("");
        let check_out = Some(check_out_raw)
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| parse_timestamp(&normalize_check_out(s, self.checkout_time)))
            .ok_or_else(|| Rejection::UnparseableCheckOut {
                raw: check_out_raw.to_string(),
            })?;

        if check_in >= check_out {
            return Err(Rejection::InvalidStayRange {
                check_in,
                check_out,
            });
        }

        let (booked_at, booked_at_defaulted) =
            match raw.reservation_date.as_deref().and_then(parse_timestamp) {
                Some(ts) => (ts, false),
                None => (ingested_at, true),
            };

        let customer_name = non_blank(raw.customer_name.as_deref()).unwrap_or_default();
        let room_description = non_blank(raw.room_info.as_deref()).unwrap_or_default();
        let status = non_blank(raw.reservation_status.as_deref())
            .unwrap_or_else(|| DEFAULT_STATUS.to_string());

        let is_canceled =
            self.classifier
                .classify(&status, &customer_name, &room_description, &reservation_no);

        Ok(PreparedRecord {
            record: ReservationRecord {
                id: ReservationRecord::compose_id(channel, &reservation_no),
                tenant_id: tenant_id.to_string(),
                channel: channel.to_string(),
                customer_name,
                phone_number: normalize_phone(raw.phone_number.as_deref()),
                room_description,
                check_in,
                check_out,
                booked_at,
                status,
                price: normalize_price(raw.price.as_ref()),
                special_requests: non_blank(raw.special_requests.as_deref()),
                coupon_info: non_blank(raw.coupon_info.as_deref()),
                additional_fees: normalize_price(raw.additional_fees.as_ref()),
                payment_status: non_blank(raw.payment_status.as_deref())
                    .unwrap_or_else(|| DEFAULT_PAYMENT_STATUS.to_string()),
                payment_method: resolve_payment_method(
                    channel,
                    raw.payment_method.as_deref(),
                    &self.engine,
                ),
                is_canceled,
                extra: raw.extra.clone(),
            },
            booked_at_defaulted,
        })
    }

    async fn provision(&self, tenant_id: &str) -> ReconResult<TenantProfile> {
        let failed = |e: staysync_common::Error| ReconError::Provisioning {
            tenant_id: tenant_id.to_string(),
            message: e.to_string(),
        };

        let profile = with_timeout(
            self.settings.store_timeout,
            "tenant lookup",
            self.directory.ensure_provisioned(tenant_id),
        )
        .await
        .map_err(failed)?;

        with_timeout(
            self.settings.store_timeout,
            "partition provisioning",
            self.store.provision(tenant_id),
        )
        .await
        .map_err(failed)?;

        Ok(profile)
    }

    /// Queue the on-site confirmation if the record qualifies
    fn notify(&self, record: &ReservationRecord, profile: &TenantProfile) -> bool {
        let blockers = gate_blockers(record, &self.engine, profile);
        if !blockers.is_empty() {
            debug!(id = %record.id, ?blockers, "No guest notification");
            return false;
        }

        match &self.outbox {
            Some(outbox) => outbox.enqueue(onsite_request(record, profile, &self.template_id)),
            None => {
                debug!(id = %record.id, "No notification outbox attached");
                false
            }
        }
    }

    fn skip(
        &self,
        summary: &mut BatchSummary,
        index: usize,
        reservation_no: Option<String>,
        reservation_id: Option<String>,
        reason: SkipReason,
    ) {
        self.emit(|| ReconEvent::RecordSkipped {
            run_id: summary.run_id,
            tenant_id: summary.tenant_id.clone(),
            index,
            reason: reason.to_string(),
            timestamp: chrono::Utc::now(),
        });
        summary.skipped.push(SkippedRecord {
            index,
            reservation_no,
            reservation_id,
            reason,
        });
    }

    /// Events are only built when someone is listening
    fn emit(&self, build: impl FnOnce() -> ReconEvent) {
        if let Some(events) = &self.events {
            if events.subscriber_count() > 0 {
                events.emit_lossy(build());
            }
        }
    }

    async fn start_run(&self, run_id: Uuid, tenant_id: &str, channel: &str, count: usize) {
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.start_run(run_id, tenant_id, channel, count).await {
                warn!(%run_id, error = %e, "Could not record ingest run start");
            }
        }
    }

    async fn finish_run(&self, summary: &BatchSummary, status: RunStatus) {
        if let Some(ledger) = &self.ledger {
            let result = RunResult {
                status,
                processed: summary.processed,
                skipped: summary.skipped.len(),
                last_error: summary.skipped.last().map(|s| s.reason.to_string()),
            };
            if let Err(e) = ledger.finish_run(summary.run_id, &result).await {
                warn!(run_id = %summary.run_id, error = %e, "Could not record ingest run result");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::KeywordClassifier;
    use crate::store::SqliteReservationStore;
    use crate::tenants::SqliteTenantDirectory;
    use chrono::NaiveDate;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use staysync_common::PaymentMethod;

    async fn reconciler() -> BatchReconciler {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        staysync_common::db::create_schema(&pool).await.unwrap();
        BatchReconciler::new(
            Arc::new(SqliteReservationStore::new(pool.clone(), 1000)),
            Arc::new(SqliteTenantDirectory::new(pool, true, 1000)),
            Arc::new(KeywordClassifier::default()),
            EngineConfig::default(),
        )
        .unwrap()
    }

    fn raw(value: serde_json::Value) -> RawRecord {
        serde_json::from_value(value).unwrap()
    }

    fn ingested() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_prepare_normalizes_fields() {
        let r = reconciler().await;
        let prepared = r
            .prepare(
                "h1",
                "Expedia",
                &raw(json!({
                    "reservationNo": 555,
                    "customerName": " Kim ",
                    "phoneNumber": "010-1234-5678",
                    "checkIn": "2024.05.10 15:00",
                    "checkOut": "2024-05-11",
                    "price": "₩120,000",
                    "paymentMethod": "Cash",
                    "reservationDate": "2024-04-02 10:00"
                })),
                ingested(),
            )
            .unwrap();

        let rec = prepared.record;
        assert_eq!(rec.id, "Expedia-555");
        assert_eq!(rec.customer_name, "Kim");
        assert_eq!(rec.phone_number, "01012345678");
        assert_eq!(rec.check_out.format("%Y-%m-%d %H:%M").to_string(), "2024-05-11 11:00");
        assert_eq!(rec.price, 120000);
        assert_eq!(rec.payment_method, PaymentMethod::ChannelBilled);
        assert_eq!(rec.status, "Pending");
        assert_eq!(rec.payment_status, "unconfirmed");
        assert!(!rec.is_canceled);
        assert!(!prepared.booked_at_defaulted);
    }

    #[tokio::test]
    async fn test_prepare_defaults_booked_at() {
        let r = reconciler().await;
        let prepared = r
            .prepare(
                "h1",
                "walk-in",
                &raw(json!({
                    "reservationNo": "W1",
                    "checkIn": "2024-05-10 15:00",
                    "checkOut": "2024-05-11 11:00",
                    "reservationDate": "sometime"
                })),
                ingested(),
            )
            .unwrap();
        assert!(prepared.booked_at_defaulted);
        assert_eq!(prepared.record.booked_at, ingested());
    }

    #[tokio::test]
    async fn test_prepare_rejections() {
        let r = reconciler().await;
        let base = |no: serde_json::Value, check_in: &str, check_out: &str| {
            raw(json!({"reservationNo": no, "checkIn": check_in, "checkOut": check_out}))
        };

        let cases = [
            (
                base(json!(null), "2024-05-10", "2024-05-11"),
                Rejection::MissingReservationNumber,
            ),
            (
                base(json!("  "), "2024-05-10", "2024-05-11"),
                Rejection::MissingReservationNumber,
            ),
            (
                base(json!("n/a"), "2024-05-10", "2024-05-11"),
                Rejection::SentinelReservationNumber {
                    value: "n/a".to_string(),
                },
            ),
            (
                base(json!("1"), "not a date", "2024-05-11"),
                Rejection::UnparseableCheckIn {
                    raw: "not a date".to_string(),
                },
            ),
            (
                base(json!("1"), "2024-05-10", ""),
                Rejection::UnparseableCheckOut { raw: String::new() },
            ),
        ];

        for (record, expected) in cases {
            assert_eq!(r.prepare("h1", "Agoda", &record, ingested()), Err(expected));
        }

        let inverted = base(json!("1"), "2024-05-12 15:00", "2024-05-11");
        assert!(matches!(
            r.prepare("h1", "Agoda", &inverted, ingested()),
            Err(Rejection::InvalidStayRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_blank_tenant_or_channel_is_invalid_batch() {
        let r = reconciler().await;
        assert!(matches!(
            r.reconcile(" ", "Agoda", &[]).await,
            Err(ReconError::InvalidBatch(_))
        ));
        assert!(matches!(
            r.reconcile("h1", "", &[]).await,
            Err(ReconError::InvalidBatch(_))
        ));
    }
}
