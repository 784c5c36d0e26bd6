//! Guest notifications
//!
//! A new front-desk (walk-in) reservation gets a confirmation message on the
//! guest's phone. The reconciler only decides whether to notify and enqueues
//! a request on the outbox; delivery happens on a dispatcher task so a slow
//! or failing messaging API never holds up reconciliation.

pub mod alimtalk;
pub mod outbox;

pub use alimtalk::AlimTalkNotifier;
pub use outbox::{spawn_outbox, DispatchStats, NotificationOutbox, OutboxWorker};

use async_trait::async_trait;
use serde::Serialize;
use staysync_common::config::{EngineConfig, NotifierConfig};
use staysync_common::db::models::TenantProfile;
use staysync_common::{ReservationRecord, Result};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    /// The messaging API answered but refused the message
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        phone_number: &str,
        template_id: &str,
        text: &str,
    ) -> std::result::Result<(), NotifyError>;
}

/// A queued guest message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub tenant_id: String,
    pub reservation_id: String,
    pub phone_number: String,
    pub template_id: String,
    pub text: String,
}

/// Reasons a new reservation gets no message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateBlocker {
    NotWalkIn,
    HourlyStay,
    NoPhone,
    TenantDisabled,
}

/// Everything that stops `record` from being notified; empty means send
pub fn gate_blockers(
    record: &ReservationRecord,
    engine: &EngineConfig,
    tenant: &TenantProfile,
) -> Vec<GateBlocker> {
    let mut blockers = Vec::new();

    if record.channel != engine.walk_in_channel {
        blockers.push(GateBlocker::NotWalkIn);
    }

    let room = record.room_description.to_lowercase();
    let name = record.customer_name.to_lowercase();
    let hourly = engine
        .hourly_stay_markers
        .iter()
        .map(|m| m.to_lowercase())
        .filter(|m| !m.is_empty())
        .any(|m| room.contains(&m) || name.contains(&m));
    if hourly {
        blockers.push(GateBlocker::HourlyStay);
    }

    if record.phone_number.is_empty() {
        blockers.push(GateBlocker::NoPhone);
    }

    if !tenant.notifications_enabled {
        blockers.push(GateBlocker::TenantDisabled);
    }

    blockers
}

/// Message text for a new on-site reservation
pub fn render_onsite_message(record: &ReservationRecord, tenant: &TenantProfile) -> String {
    let contact = tenant
        .contact_phone
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(tenant.display_name.as_str());

    format!(
        "[현장예약 안내]\n\
         예약자명: {}\n\
         체크인: {}\n\
         체크아웃: {}\n\
         가격: {}원\n\
         문의: {}",
        record.customer_name,
        record.check_in.format("%Y-%m-%d %H:%M"),
        record.check_out.format("%Y-%m-%d %H:%M"),
        record.price,
        contact
    )
}

/// Build the request for a record that passed the gate
pub fn onsite_request(
    record: &ReservationRecord,
    tenant: &TenantProfile,
    template_id: &str,
) -> NotificationRequest {
    NotificationRequest {
        tenant_id: record.tenant_id.clone(),
        reservation_id: record.id.clone(),
        phone_number: record.phone_number.clone(),
        template_id: template_id.to_string(),
        text: render_onsite_message(record, tenant),
    }
}

/// Notifier that only logs; used when no messaging endpoint is configured
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        phone_number: &str,
        template_id: &str,
        text: &str,
    ) -> std::result::Result<(), NotifyError> {
        info!(
            phone_number,
            template_id,
            chars = text.chars().count(),
            "Notification (log only, no endpoint configured)"
        );
        Ok(())
    }
}

/// Notifier for the configured delivery mode
pub fn notifier_from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier>> {
    match config.endpoint.as_deref().map(str::trim) {
        Some(endpoint) if !endpoint.is_empty() => {
            Ok(Arc::new(AlimTalkNotifier::from_config(endpoint, config)?))
        }
        _ => {
            info!("No notifier endpoint configured, notifications will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}
