//! Persistent reservation store
//!
//! Each tenant owns two logical partitions, active and canceled. An id lives
//! in at most one of them: the SQLite implementation keys rows by
//! `(tenant_id, id)` and keeps the partition in a column, so a move between
//! partitions is a single conditional UPDATE.
//!
//! Every mutation except `delete` is conditional. `insert` only succeeds when
//! the id is absent; `overwrite` and `move_to` only succeed when the stored
//! version still matches what the caller read. A `false` return means another
//! writer got there first and the caller must re-read.

pub mod sqlite;

pub use sqlite::SqliteReservationStore;

use async_trait::async_trait;
use staysync_common::db::models::StoredReservation;
use staysync_common::{Error, Partition, ReservationRecord, Result};

/// Filter for partition listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Exact customer name, compared case-insensitively
    pub customer_name: Option<String>,
    pub limit: Option<u32>,
}

impl ListFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            customer_name: Some(name.into()),
            limit: None,
        }
    }
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Make sure the tenant's partitions exist (idempotent)
    async fn provision(&self, tenant_id: &str) -> Result<()>;

    /// Look an id up in both partitions at once
    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<StoredReservation>>;

    /// Look an id up in one partition
    async fn get_in(
        &self,
        tenant_id: &str,
        partition: Partition,
        id: &str,
    ) -> Result<Option<StoredReservation>>;

    /// Insert a new record; `false` if the id already exists in either partition
    async fn insert(
        &self,
        tenant_id: &str,
        partition: Partition,
        record: &ReservationRecord,
    ) -> Result<bool>;

    /// Replace a record in place; `false` if it changed since `expected_version`
    async fn overwrite(
        &self,
        tenant_id: &str,
        partition: Partition,
        record: &ReservationRecord,
        expected_version: i64,
    ) -> Result<bool>;

    /// Move a record between partitions, replacing its content
    ///
    /// The record is never visible in both or neither partition.
    async fn move_to(
        &self,
        tenant_id: &str,
        from: Partition,
        to: Partition,
        record: &ReservationRecord,
        expected_version: i64,
    ) -> Result<bool>;

    /// Remove a record; `false` if it was not there
    async fn delete(&self, tenant_id: &str, partition: Partition, id: &str) -> Result<bool>;

    /// Records of one partition, newest first
    async fn list(
        &self,
        tenant_id: &str,
        partition: Partition,
        filter: &ListFilter,
    ) -> Result<Vec<StoredReservation>>;
}

/// Reject writes that would break tenant scoping or partition agreement
pub fn check_record(
    tenant_id: &str,
    partition: Partition,
    record: &ReservationRecord,
) -> Result<()> {
    if record.tenant_id != tenant_id {
        return Err(Error::InvalidInput(format!(
            "record {} belongs to tenant '{}', not '{}'",
            record.id, record.tenant_id, tenant_id
        )));
    }
    if record.partition() != partition {
        return Err(Error::InvalidInput(format!(
            "record {} with is_canceled={} cannot be written to the {} partition",
            record.id, record.is_canceled, partition
        )));
    }
    Ok(())
}
