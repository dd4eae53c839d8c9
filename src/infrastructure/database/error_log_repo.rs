//! SQLite implementation of the ErrorLogRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ErrorLog, EventStatus};
use crate::domain::ports::repositories::ErrorLogRepository;

use super::parse_ts;

#[derive(Clone)]
pub struct SqliteErrorLogRepository {
    pool: SqlitePool,
}

impl SqliteErrorLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ErrorLogRow {
    id: i64,
    event_record_id: i64,
    event_status: String,
    error_desc: String,
    repeat_count: i64,
    resolved: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ErrorLogRow> for ErrorLog {
    type Error = DomainError;

    fn try_from(row: ErrorLogRow) -> Result<Self, Self::Error> {
        let event_status = EventStatus::from_str(&row.event_status).ok_or_else(|| {
            DomainError::SerializationError(format!("unknown event status {:?}", row.event_status))
        })?;
        Ok(ErrorLog {
            id: row.id,
            event_record_id: row.event_record_id,
            event_status,
            error_desc: row.error_desc,
            repeat_count: u32::try_from(row.repeat_count).unwrap_or(0),
            resolved: row.resolved != 0,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl ErrorLogRepository for SqliteErrorLogRepository {
    async fn record(
        &self,
        event_record_id: i64,
        event_status: EventStatus,
        error_desc: &str,
    ) -> DomainResult<ErrorLog> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO error_logs
               (event_record_id, event_status, error_desc, repeat_count, resolved,
                created_at, updated_at)
               VALUES (?, ?, ?, 1, 0, ?, ?)
               ON CONFLICT(event_record_id, event_status, error_desc)
               DO UPDATE SET repeat_count = repeat_count + 1,
                             resolved = 0,
                             updated_at = excluded.updated_at"#,
        )
        .bind(event_record_id)
        .bind(event_status.as_str())
        .bind(error_desc)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let row: ErrorLogRow = sqlx::query_as(
            r#"SELECT * FROM error_logs
               WHERE event_record_id = ? AND event_status = ? AND error_desc = ?"#,
        )
        .bind(event_record_id)
        .bind(event_status.as_str())
        .bind(error_desc)
        .fetch_one(&self.pool)
        .await?;
        ErrorLog::try_from(row)
    }
}
