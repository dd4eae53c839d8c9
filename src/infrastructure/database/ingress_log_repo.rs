//! SQLite implementation of the IngressLogRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{IngressLog, IngressMethod, IngressStatus, IngressTask, NewIngressLog};
use crate::domain::ports::repositories::{ClaimOutcome, IngressLogRepository};

use super::parse_ts;

#[derive(Clone)]
pub struct SqliteIngressLogRepository {
    pool: SqlitePool,
}

impl SqliteIngressLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct IngressLogRow {
    id: i64,
    remote_ip: String,
    method: String,
    task: String,
    task_data: String,
    status: String,
    failure_reason: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<IngressLogRow> for IngressLog {
    type Error = DomainError;

    fn try_from(row: IngressLogRow) -> Result<Self, Self::Error> {
        let bad = |what: &str, value: &str| {
            DomainError::SerializationError(format!("unknown ingress {what} {value:?}"))
        };
        Ok(IngressLog {
            id: row.id,
            remote_ip: row.remote_ip,
            method: IngressMethod::from_str(&row.method)
                .ok_or_else(|| bad("method", &row.method))?,
            task: IngressTask::from_str(&row.task).ok_or_else(|| bad("task", &row.task))?,
            task_data: serde_json::from_str(&row.task_data)?,
            status: IngressStatus::from_str(&row.status)
                .ok_or_else(|| bad("status", &row.status))?,
            failure_reason: row.failure_reason,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl IngressLogRepository for SqliteIngressLogRepository {
    async fn create(&self, log: &NewIngressLog) -> DomainResult<IngressLog> {
        let now = Utc::now();
        let task_data_json = serde_json::to_string(&log.task_data)?;

        let result = sqlx::query(
            r#"INSERT INTO ingress_logs
               (remote_ip, method, task, task_data, status, failure_reason, created_at, updated_at)
               VALUES (?, ?, ?, ?, 'new', '', ?, ?)"#,
        )
        .bind(&log.remote_ip)
        .bind(log.method.as_str())
        .bind(log.task.as_str())
        .bind(&task_data_json)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(IngressLog {
            id: result.last_insert_rowid(),
            remote_ip: log.remote_ip.clone(),
            method: log.method,
            task: log.task,
            task_data: log.task_data.clone(),
            status: IngressStatus::New,
            failure_reason: String::new(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, id: i64) -> DomainResult<Option<IngressLog>> {
        let row: Option<IngressLogRow> = sqlx::query_as("SELECT * FROM ingress_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(IngressLog::try_from).transpose()
    }

    async fn set_status(
        &self,
        id: i64,
        status: IngressStatus,
        failure_reason: &str,
    ) -> DomainResult<()> {
        sqlx::query(
            "UPDATE ingress_logs SET status = ?, failure_reason = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(failure_reason)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim(&self, id: i64, holder: &str, until: DateTime<Utc>) -> DomainResult<ClaimOutcome> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"UPDATE ingress_logs
               SET locked_by = ?, locked_until = ?
               WHERE id = ? AND (locked_by IS NULL OR locked_until IS NULL OR locked_until < ?)"#,
        )
        .bind(holder)
        .bind(until.to_rfc3339())
        .bind(id)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(ClaimOutcome::Claimed);
        }
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM ingress_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(if exists.is_some() { ClaimOutcome::Contended } else { ClaimOutcome::Missing })
    }

    async fn release(&self, id: i64, holder: &str) -> DomainResult<()> {
        sqlx::query(
            "UPDATE ingress_logs SET locked_by = NULL, locked_until = NULL
             WHERE id = ? AND locked_by = ?",
        )
        .bind(id)
        .bind(holder)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_orphans_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query(
            r#"DELETE FROM ingress_logs
               WHERE created_at < ?
                 AND id NOT IN (SELECT ingress_log_id FROM event_records)"#,
        )
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
