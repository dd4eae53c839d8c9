//! SQLite-backed cluster lock.
//!
//! One row per named lock. Acquisition inserts the row or takes over an
//! expired lease; both paths are a single statement, so the lock is safe
//! across workers sharing the database.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;
use crate::domain::ports::cluster_lock::ClusterLock;

#[derive(Clone)]
pub struct SqliteClusterLock {
    pool: SqlitePool,
}

impl SqliteClusterLock {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClusterLock for SqliteClusterLock {
    async fn try_acquire(&self, name: &str, holder: &str, lease: Duration) -> DomainResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO cluster_locks (name, holder, expires_at) VALUES (?, ?, ?)
               ON CONFLICT(name) DO UPDATE SET
                 holder = excluded.holder,
                 expires_at = excluded.expires_at
               WHERE cluster_locks.expires_at < ?"#,
        )
        .bind(name)
        .bind(holder)
        .bind((now + lease).to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, name: &str, holder: &str) -> DomainResult<bool> {
        let result = sqlx::query(
            "DELETE FROM cluster_locks WHERE name = ? AND holder = ? AND expires_at >= ?",
        )
        .bind(name)
        .bind(holder)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
