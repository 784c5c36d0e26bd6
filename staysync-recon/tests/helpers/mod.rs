//! Test Helper Utilities
//!
//! Shared utilities for testing staysync-recon

#![allow(dead_code)]

pub mod db_utils;
pub mod doubles;

pub use db_utils::{create_test_db, raw, test_reconciler, TestHarness};
pub use doubles::{FailingStore, RecordingNotifier};
