//! Reconciliation state machine
//!
//! Per `(tenant_id, id)` a reservation is Absent, Active or Canceled. The
//! pure `decide` maps the current state and the new verdict to a transition;
//! `apply` executes it against the store with read-decide-write retried
//! until a conditional write lands.
//!
//! | current  | verdict  | transition          |
//! |----------|----------|---------------------|
//! | Absent   | active   | insert into active  |
//! | Absent   | canceled | insert into canceled|
//! | Active   | active   | overwrite in place  |
//! | Active   | canceled | move to canceled    |
//! | Canceled | canceled | overwrite in place  |
//! | Canceled | active   | move to active      |

use crate::store::ReservationStore;
use serde::Serialize;
use staysync_common::events::RecordOutcome;
use staysync_common::{Error, Partition, ReservationRecord, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Where a reservation id currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentState {
    Absent,
    Active,
    Canceled,
}

impl From<Option<Partition>> for CurrentState {
    fn from(partition: Option<Partition>) -> Self {
        match partition {
            None => CurrentState::Absent,
            Some(Partition::Active) => CurrentState::Active,
            Some(Partition::Canceled) => CurrentState::Canceled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    InsertActive,
    InsertCanceled,
    OverwriteActive,
    OverwriteCanceled,
    MoveToCanceled,
    MoveToActive,
}

impl Transition {
    /// Partition the record ends up in
    pub fn target(&self) -> Partition {
        match self {
            Transition::InsertActive | Transition::OverwriteActive | Transition::MoveToActive => {
                Partition::Active
            }
            Transition::InsertCanceled
            | Transition::OverwriteCanceled
            | Transition::MoveToCanceled => Partition::Canceled,
        }
    }

    /// Partition the record is read from; `None` for inserts
    pub fn source(&self) -> Option<Partition> {
        match self {
            Transition::InsertActive | Transition::InsertCanceled => None,
            Transition::OverwriteActive | Transition::MoveToCanceled => Some(Partition::Active),
            Transition::OverwriteCanceled | Transition::MoveToActive => Some(Partition::Canceled),
        }
    }

    pub fn outcome(&self) -> RecordOutcome {
        let to = self.target();
        match self.source() {
            None => RecordOutcome::Inserted { partition: to },
            Some(from) if from == to => RecordOutcome::Updated { partition: to },
            Some(from) => RecordOutcome::Moved { from, to },
        }
    }

    /// Only a brand-new active reservation may trigger a guest notification
    pub fn is_new_active(&self) -> bool {
        matches!(self, Transition::InsertActive)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::InsertActive => "insert_active",
            Transition::InsertCanceled => "insert_canceled",
            Transition::OverwriteActive => "overwrite_active",
            Transition::OverwriteCanceled => "overwrite_canceled",
            Transition::MoveToCanceled => "move_to_canceled",
            Transition::MoveToActive => "move_to_active",
        }
    }
}

/// Transition for a record with the given verdict
pub fn decide(current: CurrentState, is_canceled: bool) -> Transition {
    match (current, is_canceled) {
        (CurrentState::Absent, false) => Transition::InsertActive,
        (CurrentState::Absent, true) => Transition::InsertCanceled,
        (CurrentState::Active, false) => Transition::OverwriteActive,
        (CurrentState::Active, true) => Transition::MoveToCanceled,
        (CurrentState::Canceled, true) => Transition::OverwriteCanceled,
        (CurrentState::Canceled, false) => Transition::MoveToActive,
    }
}

/// Bounds on a single record's reconciliation
#[derive(Debug, Clone, Copy)]
pub struct ApplyLimits {
    /// Deadline for each store call
    pub store_timeout: Duration,
    /// Read-decide-write rounds before giving up with a conflict
    pub max_attempts: u32,
}

/// A record as it was written
#[derive(Debug, Clone)]
pub struct Applied {
    pub transition: Transition,
    pub record: ReservationRecord,
}

/// Reconcile one normalized record into the store
///
/// `booked_at_defaulted` marks a `booked_at` that was filled in with the
/// ingestion time; an existing record keeps its stored value instead.
pub async fn apply(
    store: &dyn ReservationStore,
    tenant_id: &str,
    record: &ReservationRecord,
    booked_at_defaulted: bool,
    limits: ApplyLimits,
) -> Result<Applied> {
    let attempts = limits.max_attempts.max(1);

    for attempt in 1..=attempts {
        let current = with_timeout(
            limits.store_timeout,
            "reservation lookup",
            store.get(tenant_id, &record.id),
        )
        .await?;

        let transition = decide(
            CurrentState::from(current.as_ref().map(|s| s.partition)),
            record.is_canceled,
        );

        let mut to_write = record.clone();
        if booked_at_defaulted {
            if let Some(stored) = &current {
                to_write.booked_at = stored.record.booked_at;
            }
        }

        let target = transition.target();
        let written = match (transition.source(), &current) {
            (None, _) => {
                with_timeout(
                    limits.store_timeout,
                    "reservation insert",
                    store.insert(tenant_id, target, &to_write),
                )
                .await?
            }
            (Some(from), Some(stored)) if from == target => {
                with_timeout(
                    limits.store_timeout,
                    "reservation overwrite",
                    store.overwrite(tenant_id, target, &to_write, stored.version),
                )
                .await?
            }
            (Some(from), Some(stored)) => {
                with_timeout(
                    limits.store_timeout,
                    "reservation move",
                    store.move_to(tenant_id, from, target, &to_write, stored.version),
                )
                .await?
            }
            (Some(_), None) => {
                return Err(Error::Internal(format!(
                    "transition {} decided without a stored record",
                    transition.as_str()
                )))
            }
        };

        if written {
            debug!(
                tenant_id,
                id = %record.id,
                transition = transition.as_str(),
                attempt,
                "Record reconciled"
            );
            return Ok(Applied {
                transition,
                record: to_write,
            });
        }

        debug!(
            tenant_id,
            id = %record.id,
            transition = transition.as_str(),
            attempt,
            "Concurrent write won, re-reading"
        );
    }

    Err(Error::Conflict(format!(
        "{} kept changing concurrently; gave up after {} attempts",
        record.id, attempts
    )))
}

/// Run a store call with a deadline
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "{} exceeded {} ms",
            operation,
            limit.as_millis()
        ))),
    }
}
