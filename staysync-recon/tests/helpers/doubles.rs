//! Test doubles for the reconciler's collaborators

use async_trait::async_trait;
use staysync_common::db::models::StoredReservation;
use staysync_common::{Error, Partition, ReservationRecord, Result};
use staysync_recon::notify::{Notifier, NotifyError};
use staysync_recon::store::{ListFilter, ReservationStore};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A sent message as the notifier saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub phone_number: String,
    pub template_id: String,
    pub text: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        phone_number: &str,
        template_id: &str,
        text: &str,
    ) -> std::result::Result<(), NotifyError> {
        self.sent.lock().unwrap().push(SentMessage {
            phone_number: phone_number.to_string(),
            template_id: template_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Store wrapper whose writes fail for selected ids
pub struct FailingStore {
    inner: Arc<dyn ReservationStore>,
    failing_ids: HashSet<String>,
    /// Always lose the conditional write, as if another writer kept winning
    pub always_conflict: bool,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn ReservationStore>, failing_ids: &[&str]) -> Self {
        Self {
            inner,
            failing_ids: failing_ids.iter().map(|s| s.to_string()).collect(),
            always_conflict: false,
        }
    }

    fn check(&self, id: &str) -> Result<()> {
        if self.failing_ids.contains(id) {
            return Err(Error::Internal(format!("injected write failure for {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for FailingStore {
    async fn provision(&self, tenant_id: &str) -> Result<()> {
        self.inner.provision(tenant_id).await
    }

    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<StoredReservation>> {
        self.inner.get(tenant_id, id).await
    }

    async fn get_in(
        &self,
        tenant_id: &str,
        partition: Partition,
        id: &str,
    ) -> Result<Option<StoredReservation>> {
        self.inner.get_in(tenant_id, partition, id).await
    }

    async fn insert(
        &self,
        tenant_id: &str,
        partition: Partition,
        record: &ReservationRecord,
    ) -> Result<bool> {
        self.check(&record.id)?;
        if self.always_conflict {
            return Ok(false);
        }
        self.inner.insert(tenant_id, partition, record).await
    }

    async fn overwrite(
        &self,
        tenant_id: &str,
        partition: Partition,
        record: &ReservationRecord,
        expected_version: i64,
    ) -> Result<bool> {
        self.check(&record.id)?;
        if self.always_conflict {
            return Ok(false);
        }
        self.inner
            .overwrite(tenant_id, partition, record, expected_version)
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
        self.check(&record.id)?;
        if self.always_conflict {
            return Ok(false);
        }
        self.inner
            .move_to(tenant_id, from, to, record, expected_version)
            .await
    }

    async fn delete(&self, tenant_id: &str, partition: Partition, id: &str) -> Result<bool> {
        self.inner.delete(tenant_id, partition, id).await
    }

    async fn list(
        &self,
        tenant_id: &str,
        partition: Partition,
        filter: &ListFilter,
    ) -> Result<Vec<StoredReservation>> {
        self.inner.list(tenant_id, partition, filter).await
    }
}
