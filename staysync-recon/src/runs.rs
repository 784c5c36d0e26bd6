//! Ingest run ledger
//!
//! One row per reconciliation call, so operators can see when a channel was
//! last ingested for a tenant and how it went. The ledger is bookkeeping:
//! the reconciler logs and carries on when it cannot write here.

use crate::utils::retry_on_lock;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use staysync_common::{Error, Result};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in_progress" => Some(RunStatus::InProgress),
            "completed" => Some(RunStatus::Completed),
            "cancelled" => Some(RunStatus::Cancelled),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRun {
    pub run_id: Uuid,
    pub tenant_id: String,
    pub channel: String,
    pub status: RunStatus,
    pub record_count: i64,
    pub processed: i64,
    pub skipped: i64,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Final counters of a run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: RunStatus,
    pub processed: usize,
    pub skipped: usize,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct RunLedger {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl RunLedger {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub async fn start_run(
        &self,
        run_id: Uuid,
        tenant_id: &str,
        channel: &str,
        record_count: usize,
    ) -> Result<()> {
        let started_at = timestamp(Utc::now());
        retry_on_lock("ingest run start", self.max_lock_wait_ms, || {
            let pool = self.pool.clone();
            let tenant_id = tenant_id.to_string();
            let channel = channel.to_string();
            let started_at = started_at.clone();
            async move {
                sqlx::query(
                    "INSERT INTO ingest_runs (run_id, tenant_id, channel, status, record_count, started_at)
                     VALUES (?, ?, ?, 'in_progress', ?, ?)",
                )
                .bind(run_id.to_string())
                .bind(tenant_id)
                .bind(channel)
                .bind(record_count as i64)
                .bind(started_at)
                .execute(&pool)
                .await
                .map_err(Error::Database)?;
                Ok::<(), Error>(())
            }
        })
        .await
    }

    pub async fn finish_run(&self, run_id: Uuid, result: &RunResult) -> Result<()> {
        let finished_at = timestamp(Utc::now());
        let updated = retry_on_lock("ingest run finish", self.max_lock_wait_ms, || {
            let pool = self.pool.clone();
            let finished_at = finished_at.clone();
            let last_error = result.last_error.clone();
            async move {
                let done = sqlx::query(
                    "UPDATE ingest_runs
                     SET status = ?, processed = ?, skipped = ?, last_error = ?, finished_at = ?
                     WHERE run_id = ?",
                )
                .bind(result.status.as_str())
                .bind(result.processed as i64)
                .bind(result.skipped as i64)
                .bind(last_error)
                .bind(finished_at)
                .bind(run_id.to_string())
                .execute(&pool)
                .await
                .map_err(Error::Database)?;
                Ok::<u64, Error>(done.rows_affected())
            }
        })
        .await?;

        if updated == 0 {
            return Err(Error::NotFound(format!("Ingest run {}", run_id)));
        }
        Ok(())
    }

    /// Most recent runs for a tenant, newest first
    pub async fn list_runs(&self, tenant_id: &str, limit: u32) -> Result<Vec<IngestRun>> {
        let rows = sqlx::query(
            "SELECT run_id, tenant_id, channel, status, record_count, processed, skipped,
                    last_error, started_at, finished_at
             FROM ingest_runs
             WHERE tenant_id = ?
             ORDER BY started_at DESC
             LIMIT ?",
        )
        .bind(tenant_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_run).collect()
    }

    /// Latest run of one channel for a tenant
    pub async fn latest_run(&self, tenant_id: &str, channel: &str) -> Result<Option<IngestRun>> {
        let row = sqlx::query(
            "SELECT run_id, tenant_id, channel, status, record_count, processed, skipped,
                    last_error, started_at, finished_at
             FROM ingest_runs
             WHERE tenant_id = ? AND channel = ?
             ORDER BY started_at DESC
             LIMIT 1",
        )
        .bind(tenant_id)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_run).transpose()
    }
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Malformed run timestamp '{}': {}", raw, e)))
}

fn row_to_run(row: &SqliteRow) -> Result<IngestRun> {
    let run_id: String = row.try_get("run_id")?;
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    let finished_at: Option<String> = row.try_get("finished_at")?;

    Ok(IngestRun {
        run_id: Uuid::parse_str(&run_id)
            .map_err(|e| Error::Internal(format!("Malformed run id '{}': {}", run_id, e)))?,
        tenant_id: row.try_get("tenant_id")?,
        channel: row.try_get("channel")?,
        status: RunStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Unknown run status '{}'", status)))?,
        record_count: row.try_get("record_count")?,
        processed: row.try_get("processed")?,
        skipped: row.try_get("skipped")?,
        last_error: row.try_get("last_error")?,
        started_at: parse_timestamp(&started_at)?,
        finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
    })
}
