//! Cancellation classification
//!
//! Upstream channels have no reliable cancellation flag. Cancellation shows
//! up as a status word, a marker prefixed to the guest name or room, or a
//! suffix on the reservation number. The classifier turns those weak signals
//! into a single verdict; the reconciler stores that verdict unchanged.

use staysync_common::config::ClassifierConfig;

/// Decides whether a normalized record is canceled
pub trait CancellationClassifier: Send + Sync {
    fn classify(
        &self,
        status: &str,
        customer_name: &str,
        room_description: &str,
        reservation_no: &str,
    ) -> bool;
}

impl<F> CancellationClassifier for F
where
    F: Fn(&str, &str, &str, &str) -> bool + Send + Sync,
{
    fn classify(
        &self,
        status: &str,
        customer_name: &str,
        room_description: &str,
        reservation_no: &str,
    ) -> bool {
        self(status, customer_name, room_description, reservation_no)
    }
}

/// Case-insensitive marker matching over the four signal fields
///
/// Exempt phrases are blanked out first; "Non-refundable" contains "refund"
/// but describes a rate plan, not a cancellation.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    status_keywords: Vec<String>,
    name_markers: Vec<String>,
    room_markers: Vec<String>,
    reservation_no_markers: Vec<String>,
    exempt_phrases: Vec<String>,
}

impl KeywordClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            status_keywords: lowered(&config.status_keywords),
            name_markers: lowered(&config.name_markers),
            room_markers: lowered(&config.room_markers),
            reservation_no_markers: lowered(&config.reservation_no_markers),
            exempt_phrases: lowered(&config.exempt_phrases),
        }
    }

    fn matches(&self, field: &str, markers: &[String]) -> bool {
        if field.is_empty() || markers.is_empty() {
            return false;
        }
        let mut haystack = field.to_lowercase();
        for phrase in &self.exempt_phrases {
            if haystack.contains(phrase.as_str()) {
                haystack = haystack.replace(phrase.as_str(), " ");
            }
        }
        markers.iter().any(|m| haystack.contains(m.as_str()))
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl CancellationClassifier for KeywordClassifier {
    fn classify(
        &self,
        status: &str,
        customer_name: &str,
        room_description: &str,
        reservation_no: &str,
    ) -> bool {
        self.matches(status, &self.status_keywords)
            || self.matches(customer_name, &self.name_markers)
            || self.matches(room_description, &self.room_markers)
            || self.matches(reservation_no, &self.reservation_no_markers)
    }
}

fn lowered(markers: &[String]) -> Vec<String> {
    markers
        .iter()
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}
