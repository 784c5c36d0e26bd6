//! Event types for the StaySync event system
//!
//! Provides the reconciliation event definitions and the EventBus every
//! component publishes to. Subscribers (CLI progress output, tests, future
//! exporters) attach without the reconciler knowing about them.

use crate::db::models::Partition;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// What happened to a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// First ingestion of this id
    Inserted { partition: Partition },
    /// Overwritten in place
    Updated { partition: Partition },
    /// Verdict flipped, record changed partition
    Moved { from: Partition, to: Partition },
}

/// Reconciliation events
///
/// Events are broadcast via EventBus and serialize with a `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReconEvent {
    /// A reconciliation call started processing records
    BatchStarted {
        run_id: Uuid,
        tenant_id: String,
        channel: String,
        record_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A record was written to the store
    RecordReconciled {
        run_id: Uuid,
        tenant_id: String,
        reservation_id: String,
        outcome: RecordOutcome,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A record was rejected or failed to persist
    RecordSkipped {
        run_id: Uuid,
        tenant_id: String,
        index: usize,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A guest notification was queued for delivery
    NotificationQueued {
        tenant_id: String,
        reservation_id: String,
        template_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Notification delivery attempt finished
    NotificationDelivered {
        tenant_id: String,
        reservation_id: String,
        success: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A reconciliation call finished (possibly cancelled part way)
    BatchCompleted {
        run_id: Uuid,
        tenant_id: String,
        channel: String,
        processed: usize,
        skipped: usize,
        cancelled: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ReconEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            ReconEvent::BatchStarted { .. } => "BatchStarted",
            ReconEvent::RecordReconciled { .. } => "RecordReconciled",
            ReconEvent::RecordSkipped { .. } => "RecordSkipped",
            ReconEvent::NotificationQueued { .. } => "NotificationQueued",
            ReconEvent::NotificationDelivered { .. } => "NotificationDelivered",
            ReconEvent::BatchCompleted { .. } => "BatchCompleted",
        }
    }
}

/// Broadcast bus for ReconEvent
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ReconEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers lag
    ///
    /// # Examples
    ///
    /// ```
    /// use staysync_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ReconEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: ReconEvent) -> Result<usize, broadcast::error::SendError<ReconEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ReconEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
