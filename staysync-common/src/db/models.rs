//! Database models

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One of the two logical partitions a tenant's reservations live in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Active,
    Canceled,
}

impl Partition {
    /// Partition a record belongs to given its cancellation verdict
    pub fn for_verdict(is_canceled: bool) -> Self {
        if is_canceled {
            Partition::Canceled
        } else {
            Partition::Active
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Active => "active",
            Partition::Canceled => "canceled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Partition::Active),
            "canceled" => Some(Partition::Canceled),
            _ => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Partition::Canceled)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a reservation is paid
///
/// Reservations from an OTA channel are always settled through the channel,
/// see `ChannelBilled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Card,
    Cash,
    AccountTransfer,
    Pending,
    ChannelBilled,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "Card",
            PaymentMethod::Cash => "Cash",
            PaymentMethod::AccountTransfer => "AccountTransfer",
            PaymentMethod::Pending => "Pending",
            PaymentMethod::ChannelBilled => "ChannelBilled",
        }
    }

    /// Parse an upstream or stored label.
    ///
    /// Accepts the legacy labels "Account Transfer" and "OTA".
    pub fn parse_label(raw: &str) -> Option<Self> {
        let key: String = raw
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "card" => Some(PaymentMethod::Card),
            "cash" => Some(PaymentMethod::Cash),
            "accounttransfer" => Some(PaymentMethod::AccountTransfer),
            "pending" => Some(PaymentMethod::Pending),
            "channelbilled" | "ota" => Some(PaymentMethod::ChannelBilled),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical reservation, identical in shape in either partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRecord {
    /// `{channel}-{channel reservation number}`
    pub id: String,
    pub tenant_id: String,
    pub channel: String,
    pub customer_name: String,
    /// Digits only
    pub phone_number: String,
    pub room_description: String,
    pub check_in: NaiveDateTime,
    pub check_out: NaiveDateTime,
    pub booked_at: NaiveDateTime,
    pub status: String,
    pub price: i64,
    pub special_requests: Option<String>,
    pub coupon_info: Option<String>,
    pub additional_fees: i64,
    pub payment_status: String,
    pub payment_method: PaymentMethod,
    pub is_canceled: bool,
    /// Upstream fields without a dedicated column, kept verbatim
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl ReservationRecord {
    /// Composite key for a channel reservation number
    pub fn compose_id(channel: &str, reservation_no: &str) -> String {
        format!("{}-{}", channel, reservation_no)
    }

    /// Partition this record must live in
    pub fn partition(&self) -> Partition {
        Partition::for_verdict(self.is_canceled)
    }
}

/// A reservation as read back from the store, with its bookkeeping columns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReservation {
    pub partition: Partition,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: ReservationRecord,
}

/// Tenant (hotel) profile held by the tenant directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantProfile {
    pub tenant_id: String,
    pub display_name: String,
    /// Front-desk number quoted in guest notifications
    pub contact_phone: Option<String>,
    pub notifications_enabled: bool,
}

impl TenantProfile {
    /// Profile used when a tenant is registered on first ingestion
    pub fn with_defaults(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            display_name: tenant_id.to_string(),
            contact_phone: None,
            notifications_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_for_verdict() {
        assert_eq!(Partition::for_verdict(true), Partition::Canceled);
        assert_eq!(Partition::for_verdict(false), Partition::Active);
        assert!(Partition::Canceled.is_canceled());
    }

    #[test]
    fn test_partition_parse() {
        assert_eq!(Partition::parse("active"), Some(Partition::Active));
        assert_eq!(Partition::parse("canceled"), Some(Partition::Canceled));
        assert_eq!(Partition::parse("cancelled"), None);
    }

    #[test]
    fn test_payment_method_legacy_labels() {
        assert_eq!(
            PaymentMethod::parse_label("Account Transfer"),
            Some(PaymentMethod::AccountTransfer)
        );
        assert_eq!(PaymentMethod::parse_label("OTA"), Some(PaymentMethod::ChannelBilled));
        assert_eq!(PaymentMethod::parse_label(" cash "), Some(PaymentMethod::Cash));
        assert_eq!(PaymentMethod::parse_label("bitcoin"), None);
    }

    #[test]
    fn test_payment_method_storage_label_round_trip() {
        for method in [
            PaymentMethod::Card,
            PaymentMethod::Cash,
            PaymentMethod::AccountTransfer,
            PaymentMethod::Pending,
            PaymentMethod::ChannelBilled,
        ] {
            assert_eq!(PaymentMethod::parse_label(method.as_str()), Some(method));
        }
    }

    #[test]
    fn test_compose_id() {
        assert_eq!(ReservationRecord::compose_id("Agoda", "123456"), "Agoda-123456");
    }
}
