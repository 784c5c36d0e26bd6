//! staysync-recon library interface
//!
//! Reservation reconciliation engine: normalizes scraped channel records,
//! classifies cancellation and keeps each tenant's active and canceled
//! partitions in agreement with the latest verdict.

pub mod classifier;
pub mod dates;
pub mod error;
pub mod normalize;
pub mod notify;
pub mod operations;
pub mod reconciler;
pub mod runs;
pub mod state_machine;
pub mod store;
pub mod tenants;
pub mod types;
pub mod utils;

pub use crate::error::{ReconError, ReconResult, Rejection, SkipReason};
pub use crate::reconciler::{BatchReconciler, BatchSummary, SkippedRecord};
pub use crate::types::RawRecord;

use crate::classifier::KeywordClassifier;
use crate::notify::{notifier_from_config, spawn_outbox, DispatchStats};
use crate::runs::RunLedger;
use crate::store::SqliteReservationStore;
use crate::tenants::SqliteTenantDirectory;
use sqlx::SqlitePool;
use staysync_common::config::TomlConfig;
use staysync_common::db::{load_engine_settings, EngineSettings};
use staysync_common::events::EventBus;
use staysync_common::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Fully wired engine over one SQLite database
pub struct Engine {
    pub db: SqlitePool,
    pub reconciler: BatchReconciler,
    pub store: Arc<SqliteReservationStore>,
    pub directory: Arc<SqliteTenantDirectory>,
    pub ledger: RunLedger,
    pub event_bus: EventBus,
    pub settings: EngineSettings,
    dispatcher: JoinHandle<DispatchStats>,
}

impl Engine {
    /// Wire store, directory, classifier, ledger and notification outbox
    ///
    /// Must be called inside a tokio runtime; the notification dispatcher is
    /// spawned here.
    pub async fn open(db: SqlitePool, config: &TomlConfig) -> Result<Self> {
        config.validate()?;

        let settings = load_engine_settings(&db).await?;
        let event_bus = EventBus::new(1024);

        let store = Arc::new(SqliteReservationStore::new(
            db.clone(),
            settings.max_lock_wait_ms,
        ));
        let directory = Arc::new(SqliteTenantDirectory::new(
            db.clone(),
            config.engine.auto_register_tenants,
            settings.max_lock_wait_ms,
        ));
        let ledger = RunLedger::new(db.clone(), settings.max_lock_wait_ms);

        let notifier = notifier_from_config(&config.notifier)?;
        let (outbox, dispatcher) = spawn_outbox(
            notifier,
            settings.outbox_capacity,
            settings.notifier_timeout,
            Some(event_bus.clone()),
        );

        let reconciler = BatchReconciler::new(
            store.clone(),
            directory.clone(),
            Arc::new(KeywordClassifier::new(&config.engine.classifier)),
            config.engine.clone(),
        )?
        .with_settings(settings.clone())
        .with_template_id(config.notifier.template_id.clone())
        .with_outbox(outbox)
        .with_events(event_bus.clone())
        .with_ledger(ledger.clone());

        Ok(Self {
            db,
            reconciler,
            store,
            directory,
            ledger,
            event_bus,
            settings,
            dispatcher,
        })
    }

    /// Stop accepting work and wait for queued notifications to go out
    pub async fn shutdown(self) -> DispatchStats {
        let Engine {
            reconciler,
            dispatcher,
            ..
        } = self;
        drop(reconciler);

        match dispatcher.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Notification dispatcher ended abnormally");
                DispatchStats::default()
            }
        }
    }
}
