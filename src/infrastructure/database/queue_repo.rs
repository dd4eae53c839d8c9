//! SQLite-backed task queue.
//!
//! A `dispatch_queue` row per scheduled task. Workers claim due rows with a
//! conditional update; the claim lease makes tasks from crashed workers
//! claimable again, giving at-least-once delivery.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::task_queue::{QueuedTask, TaskKind, TaskQueue};

use super::parse_ts;

/// Lease on a claimed task before it becomes claimable again.
const CLAIM_LEASE_SECONDS: i64 = 600;

#[derive(Clone)]
pub struct SqliteTaskQueue {
    pool: SqlitePool,
}

impl SqliteTaskQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: i64,
    task: String,
    entity_id: i64,
    run_at: String,
}

impl TryFrom<QueueRow> for QueuedTask {
    type Error = DomainError;

    fn try_from(row: QueueRow) -> Result<Self, Self::Error> {
        let kind = TaskKind::from_str(&row.task).ok_or_else(|| {
            DomainError::SerializationError(format!("unknown task kind {:?}", row.task))
        })?;
        Ok(QueuedTask {
            id: row.id,
            kind,
            entity_id: row.entity_id,
            run_at: parse_ts(&row.run_at)?,
        })
    }
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    async fn enqueue(&self, kind: TaskKind, entity_id: i64, delay: Duration) -> DomainResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO dispatch_queue (task, entity_id, run_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(kind.as_str())
        .bind(entity_id)
        .bind((now + delay).to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_due(&self, holder: &str, limit: u32) -> DomainResult<Vec<QueuedTask>> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let until = (now + Duration::seconds(CLAIM_LEASE_SECONDS)).to_rfc3339();

        let candidates: Vec<(i64,)> = sqlx::query_as(
            r#"SELECT id FROM dispatch_queue
               WHERE run_at <= ? AND (claimed_by IS NULL OR claimed_until < ?)
               ORDER BY run_at, id
               LIMIT ?"#,
        )
        .bind(&now_str)
        .bind(&now_str)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for (id,) in candidates {
            let result = sqlx::query(
                r#"UPDATE dispatch_queue SET claimed_by = ?, claimed_until = ?
                   WHERE id = ? AND (claimed_by IS NULL OR claimed_until < ?)"#,
            )
            .bind(holder)
            .bind(&until)
            .bind(id)
            .bind(&now_str)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 1 {
                let row: QueueRow = sqlx::query_as(
                    "SELECT id, task, entity_id, run_at FROM dispatch_queue WHERE id = ?",
                )
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
                claimed.push(QueuedTask::try_from(row)?);
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, task_id: i64) -> DomainResult<()> {
        sqlx::query("DELETE FROM dispatch_queue WHERE id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
