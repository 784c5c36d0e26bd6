//! Field normalization
//!
//! Pure conversions from raw channel fields to canonical values. None of
//! these fail: malformed input degrades to a neutral value, and the
//! reconciler decides what is fatal for a record.

use crate::dates::has_clock_time;
use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use staysync_common::config::EngineConfig;
use staysync_common::PaymentMethod;
use tracing::warn;

static FIRST_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d[\d,]*").expect("amount regex is valid"));

/// Keep only the digits of a phone number
pub fn normalize_phone(raw: Option<&str>) -> String {
    raw.unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect()
}

/// Canonical non-negative integer amount
///
/// Numbers pass through (negatives clamp to 0, fractions truncate). Text
/// yields its first digit run with `,` separators removed, so `"₩120,000"`
/// becomes 120000. Anything else is 0.
pub fn normalize_price(raw: Option<&Value>) -> i64 {
    match raw {
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i.max(0)
            } else if n.as_u64().is_some() {
                i64::MAX
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f > 0.0)
                    .map(|f| f.trunc() as i64)
                    .unwrap_or(0)
            }
        }
        Some(Value::String(s)) => parse_amount_text(s),
        _ => 0,
    }
}

fn parse_amount_text(text: &str) -> i64 {
    FIRST_AMOUNT
        .find(text)
        .map(|m| m.as_str().replace(',', ""))
        .and_then(|digits| digits.parse::<i64>().ok())
        .unwrap_or(0)
}

/// Append the default checkout time when the value has no clock time
pub fn normalize_check_out(raw: &str, default_time: NaiveTime) -> String {
    let trimmed = raw.trim();
    if has_clock_time(trimmed) {
        trimmed.to_string()
    } else {
        format!("{} {}", trimmed, default_time.format("%H:%M"))
    }
}

/// Channel reservation number as text
///
/// Numbers are accepted as-is; blank strings count as missing.
pub fn reservation_number(raw: Option<&Value>) -> Option<String> {
    let text = match raw? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Payment method for a record
///
/// OTA reservations are always settled through the channel, whatever the
/// scraper reported.
pub fn resolve_payment_method(
    channel: &str,
    explicit: Option<&str>,
    engine: &EngineConfig,
) -> PaymentMethod {
    if engine.is_ota(channel) {
        return PaymentMethod::ChannelBilled;
    }

    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        None => PaymentMethod::Pending,
        Some(label) => PaymentMethod::parse_label(label).unwrap_or_else(|| {
            warn!(channel, label, "Unrecognized payment method, using Pending");
            PaymentMethod::Pending
        }),
    }
}

/// Text field with blank treated as absent
pub fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
