//! Tenant directory
//!
//! Resolves which hotels exist and holds the per-tenant profile the guest
//! notification needs (display name, front-desk phone, opt-out flag).

use crate::utils::retry_on_lock;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use staysync_common::db::models::TenantProfile;
use staysync_common::{Error, Result};
use tracing::info;

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn resolve(&self, tenant_id: &str) -> Result<Option<TenantProfile>>;

    /// Return the tenant's profile, registering it first if allowed
    ///
    /// Idempotent; concurrent callers for a new tenant all get the same profile.
    async fn ensure_provisioned(&self, tenant_id: &str) -> Result<TenantProfile>;

    /// Create or replace a tenant profile
    async fn register(&self, profile: &TenantProfile) -> Result<()>;
}

/// Tenant directory over the `tenants` table
#[derive(Clone)]
pub struct SqliteTenantDirectory {
    pool: SqlitePool,
    auto_register: bool,
    max_lock_wait_ms: u64,
}

impl SqliteTenantDirectory {
    pub fn new(pool: SqlitePool, auto_register: bool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            auto_register,
            max_lock_wait_ms,
        }
    }
}

#[async_trait]
impl TenantDirectory for SqliteTenantDirectory {
    async fn resolve(&self, tenant_id: &str) -> Result<Option<TenantProfile>> {
        let row = sqlx::query(
            "SELECT tenant_id, display_name, contact_phone, notifications_enabled
             FROM tenants WHERE tenant_id = ?",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(TenantProfile {
                tenant_id: row.try_get("tenant_id")?,
                display_name: row.try_get("display_name")?,
                contact_phone: row.try_get("contact_phone")?,
                notifications_enabled: row.try_get("notifications_enabled")?,
            })),
            None => Ok(None),
        }
    }

    async fn ensure_provisioned(&self, tenant_id: &str) -> Result<TenantProfile> {
        if let Some(profile) = self.resolve(tenant_id).await? {
            return Ok(profile);
        }

        if !self.auto_register {
            return Err(Error::NotFound(format!("Unknown tenant '{}'", tenant_id)));
        }

        let defaults = TenantProfile::with_defaults(tenant_id);
        retry_on_lock("tenant auto-register", self.max_lock_wait_ms, || {
            let pool = self.pool.clone();
            let profile = defaults.clone();
            async move {
                // Another batch may register the same tenant concurrently
                sqlx::query(
                    "INSERT OR IGNORE INTO tenants
                     (tenant_id, display_name, contact_phone, notifications_enabled)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(profile.tenant_id)
                .bind(profile.display_name)
                .bind(profile.contact_phone)
                .bind(profile.notifications_enabled)
                .execute(&pool)
                .await
                .map_err(Error::Database)?;
                Ok::<(), Error>(())
            }
        })
        .await?;

        info!(tenant_id, "Registered new tenant");

        self.resolve(tenant_id).await?.ok_or_else(|| {
            Error::Internal(format!("Tenant '{}' missing right after registration", tenant_id))
        })
    }

    async fn register(&self, profile: &TenantProfile) -> Result<()> {
        if profile.tenant_id.trim().is_empty() {
            return Err(Error::InvalidInput("tenant_id must not be blank".to_string()));
        }

        retry_on_lock("tenant register", self.max_lock_wait_ms, || {
            let pool = self.pool.clone();
            let profile = profile.clone();
            async move {
                sqlx::query(
                    "INSERT INTO tenants (tenant_id, display_name, contact_phone, notifications_enabled)
                     VALUES (?, ?, ?, ?)
                     ON CONFLICT(tenant_id) DO UPDATE SET
                         display_name = excluded.display_name,
                         contact_phone = excluded.contact_phone,
                         notifications_enabled = excluded.notifications_enabled",
                )
                .bind(profile.tenant_id)
                .bind(profile.display_name)
                .bind(profile.contact_phone)
                .bind(profile.notifications_enabled)
                .execute(&pool)
                .await
                .map_err(Error::Database)?;
                Ok::<(), Error>(())
            }
        })
        .await?;

        info!(tenant_id = %profile.tenant_id, "Tenant profile saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        staysync_common::db::create_tenants_table(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_auto_register_is_idempotent() {
        let directory = SqliteTenantDirectory::new(setup_pool().await, true, 1000);

        let first = directory.ensure_provisioned("h1").await.unwrap();
        let second = directory.ensure_provisioned("h1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, TenantProfile::with_defaults("h1"));
    }

    #[tokio::test]
    async fn test_unknown_tenant_without_auto_register() {
        let directory = SqliteTenantDirectory::new(setup_pool().await, false, 1000);

        let result = directory.ensure_provisioned("h1").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(directory.resolve("h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_replaces_profile() {
        let directory = SqliteTenantDirectory::new(setup_pool().await, false, 1000);
        let mut profile = TenantProfile::with_defaults("h1");
        profile.display_name = "Hotel One".to_string();
        profile.contact_phone = Some("0212345678".to_string());
        directory.register(&profile).await.unwrap();

        profile.notifications_enabled = false;
        directory.register(&profile).await.unwrap();

        assert_eq!(directory.ensure_provisioned("h1").await.unwrap(), profile);
    }
}
