//! # StaySync Common Library
//!
//! Shared code for the StaySync reservation services including:
//! - Canonical reservation model and partitions
//! - Database initialization, migrations and settings
//! - Reconciliation event types (ReconEvent enum) and EventBus
//! - Configuration loading
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use db::models::{Partition, PaymentMethod, ReservationRecord};
pub use error::{Error, Result};
