//! Notification outbox and dispatcher
//!
//! Bounded mpsc queue between the reconciler and the notifier. Enqueueing
//! never waits: when the queue is full the request is dropped with a
//! warning. Delivery is at most once; failures are logged and not retried.

use super::{NotificationRequest, Notifier};
use staysync_common::events::{EventBus, ReconEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Producer side, cloned into every reconciler
#[derive(Clone)]
pub struct NotificationOutbox {
    tx: mpsc::Sender<NotificationRequest>,
    events: Option<EventBus>,
}

impl NotificationOutbox {
    /// Queue a request; `false` if it was dropped
    pub fn enqueue(&self, request: NotificationRequest) -> bool {
        let tenant_id = request.tenant_id.clone();
        let reservation_id = request.reservation_id.clone();
        let template_id = request.template_id.clone();

        match self.tx.try_send(request) {
            Ok(()) => {
                if let Some(events) = &self.events {
                    events.emit_lossy(ReconEvent::NotificationQueued {
                        tenant_id,
                        reservation_id,
                        template_id,
                        timestamp: chrono::Utc::now(),
                    });
                }
                true
            }
            Err(TrySendError::Full(request)) => {
                warn!(
                    tenant_id = %request.tenant_id,
                    reservation_id = %request.reservation_id,
                    "Notification outbox full, dropping message"
                );
                false
            }
            Err(TrySendError::Closed(request)) => {
                warn!(
                    tenant_id = %request.tenant_id,
                    reservation_id = %request.reservation_id,
                    "Notification dispatcher stopped, dropping message"
                );
                false
            }
        }
    }
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: usize,
    pub failed: usize,
}

/// Consumer side: delivers queued requests through the notifier
pub struct OutboxWorker {
    rx: mpsc::Receiver<NotificationRequest>,
    notifier: Arc<dyn Notifier>,
    send_timeout: Duration,
    events: Option<EventBus>,
    stats: DispatchStats,
}

/// Create a connected outbox and worker without starting the worker
pub fn outbox_channel(
    notifier: Arc<dyn Notifier>,
    capacity: usize,
    send_timeout: Duration,
    events: Option<EventBus>,
) -> (NotificationOutbox, OutboxWorker) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let outbox = NotificationOutbox {
        tx,
        events: events.clone(),
    };
    let worker = OutboxWorker {
        rx,
        notifier,
        send_timeout,
        events,
        stats: DispatchStats::default(),
    };
    (outbox, worker)
}

/// Start the dispatcher task
///
/// The task ends once every `NotificationOutbox` clone is dropped and the
/// queue is empty, returning its counters.
pub fn spawn_outbox(
    notifier: Arc<dyn Notifier>,
    capacity: usize,
    send_timeout: Duration,
    events: Option<EventBus>,
) -> (NotificationOutbox, JoinHandle<DispatchStats>) {
    let (outbox, worker) = outbox_channel(notifier, capacity, send_timeout, events);
    let handle = tokio::spawn(worker.run());
    (outbox, handle)
}

impl OutboxWorker {
    pub async fn run(mut self) -> DispatchStats {
        while let Some(request) = self.rx.recv().await {
            self.deliver(request).await;
        }
        info!(
            delivered = self.stats.delivered,
            failed = self.stats.failed,
            "Notification dispatcher stopped"
        );
        self.stats
    }

    /// Deliver whatever is queued right now, then return
    pub async fn drain(&mut self) -> DispatchStats {
        while let Ok(request) = self.rx.try_recv() {
            self.deliver(request).await;
        }
        self.stats
    }

    async fn deliver(&mut self, request: NotificationRequest) {
        let sent = tokio::time::timeout(
            self.send_timeout,
            self.notifier
                .send(&request.phone_number, &request.template_id, &request.text),
        )
        .await;

        let success = match sent {
            Ok(Ok(())) => {
                info!(
                    tenant_id = %request.tenant_id,
                    reservation_id = %request.reservation_id,
                    template_id = %request.template_id,
                    "Guest notification sent"
                );
                true
            }
            Ok(Err(e)) => {
                warn!(
                    tenant_id = %request.tenant_id,
                    reservation_id = %request.reservation_id,
                    error = %e,
                    "Guest notification failed"
                );
                false
            }
            Err(_) => {
                warn!(
                    tenant_id = %request.tenant_id,
                    reservation_id = %request.reservation_id,
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "Guest notification timed out"
                );
                false
            }
        };

        if success {
            self.stats.delivered += 1;
        } else {
            self.stats.failed += 1;
        }

        if let Some(events) = &self.events {
            events.emit_lossy(ReconEvent::NotificationDelivered {
                tenant_id: request.tenant_id,
                reservation_id: request.reservation_id,
                success,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}
