//! Error types for staysync-recon
//!
//! Batch-level failures are `ReconError`. Per-record problems never surface
//! as errors; they are reported as `SkipReason`s in the batch summary.

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

/// Failure of a whole reconciliation call
#[derive(Debug, Error)]
pub enum ReconError {
    /// Tenant could not be resolved or provisioned; no record was touched
    #[error("Provisioning failed for tenant '{tenant_id}': {message}")]
    Provisioning { tenant_id: String, message: String },

    /// Call arguments unusable (blank tenant or channel)
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// staysync-common error
    #[error("Common error: {0}")]
    Common(#[from] staysync_common::Error),
}

/// Result type for batch-level operations
pub type ReconResult<T> = Result<T, ReconError>;

/// Why a record was rejected before reaching the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    #[error("missing reservation number")]
    MissingReservationNumber,

    #[error("placeholder reservation number '{value}'")]
    SentinelReservationNumber { value: String },

    #[error("unparseable check-in '{raw}'")]
    UnparseableCheckIn { raw: String },

    #[error("unparseable check-out '{raw}'")]
    UnparseableCheckOut { raw: String },

    #[error("check-in {check_in} is not before check-out {check_out}")]
    InvalidStayRange {
        check_in: NaiveDateTime,
        check_out: NaiveDateTime,
    },
}

/// Why a record ended up in the skipped list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Validation rejection
    Rejected { rejection: Rejection },
    /// Store mutation failed; the record's previous state is intact
    StoreFailure { message: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Rejected { rejection } => write!(f, "rejected: {}", rejection),
            SkipReason::StoreFailure { message } => write!(f, "store failure: {}", message),
        }
    }
}
