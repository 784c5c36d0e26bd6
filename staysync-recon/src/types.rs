//! Upstream record shape
//!
//! Scrapers emit loosely typed JSON: numbers where strings are expected,
//! nulls, and channel-specific extra keys. Every field here is lenient so a
//! single odd record cannot fail deserialization of the whole batch; semantic
//! validation happens later, per record.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One reservation as reported by a channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    #[serde(default, alias = "channelReservationNumber", skip_serializing_if = "Option::is_none")]
    pub reservation_no: Option<Value>,

    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,

    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    #[serde(
        default,
        alias = "roomDescription",
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub room_info: Option<String>,

    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub check_in: Option<String>,

    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub check_out: Option<String>,

    #[serde(
        default,
        alias = "bookedAt",
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub reservation_date: Option<String>,

    #[serde(
        default,
        alias = "status",
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub reservation_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Value>,

    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub special_requests: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_fees: Option<Value>,

    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub coupon_info: Option<String>,

    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,

    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,

    /// Channel-specific keys, stored verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawRecord {
    /// Decode one batch element, degrading to an empty record on bad shape
    ///
    /// An empty record has no reservation number and is rejected per record,
    /// so one malformed element never fails its batch.
    pub fn from_value_lenient(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Batch element is not a reservation object");
            RawRecord::default()
        })
    }
}

/// Decode a JSON batch: an array of records, or `{"records": [...]}`
pub fn parse_batch(json: &str) -> serde_json::Result<Vec<RawRecord>> {
    let value: Value = serde_json::from_str(json)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("records") {
            Some(Value::Array(items)) => items,
            _ => vec![Value::Object(obj)],
        },
        other => vec![other],
    };
    Ok(items.into_iter().map(RawRecord::from_value_lenient).collect())
}

/// Accept strings, numbers and booleans as text; null and objects as absent
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}
