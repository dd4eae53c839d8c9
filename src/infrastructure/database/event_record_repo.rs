//! SQLite implementation of the EventRecordRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EventExtras, EventRecord, EventStatus, EventType, NewEventRecord, COMPLETE_EVENT_STATUS,
};
use crate::domain::ports::repositories::{ClaimOutcome, EventRecordRepository};

use super::parse_ts;

#[derive(Clone)]
pub struct SqliteEventRecordRepository {
    pool: SqlitePool,
}

impl SqliteEventRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRecordRow {
    id: i64,
    ingress_log_id: i64,
    monitor_tool_ip: Option<String>,
    doc_id: String,
    doc_index: String,
    status: String,
    event_type: String,
    event_ts: String,
    title: Option<String>,
    level: Option<String>,
    asset_unique_id: Option<String>,
    asset_type: Option<String>,
    retry_count: i64,
    extras: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<EventRecordRow> for EventRecord {
    type Error = DomainError;

    fn try_from(row: EventRecordRow) -> Result<Self, Self::Error> {
        let status = EventStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("unknown event status {:?}", row.status))
        })?;
        let event_type = EventType::from_str(&row.event_type).unwrap_or(EventType::Missing);
        let extras: EventExtras = serde_json::from_str(&row.extras)?;

        Ok(EventRecord {
            id: row.id,
            ingress_log_id: row.ingress_log_id,
            monitor_tool_ip: row.monitor_tool_ip,
            doc_id: row.doc_id,
            doc_index: row.doc_index,
            status,
            event_type,
            event_ts: parse_ts(&row.event_ts)?,
            title: row.title,
            level: row.level,
            asset_unique_id: row.asset_unique_id,
            asset_type: row.asset_type,
            retry_count: u32::try_from(row.retry_count).unwrap_or(0),
            extras,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl EventRecordRepository for SqliteEventRecordRepository {
    async fn create(&self, record: &NewEventRecord) -> DomainResult<EventRecord> {
        let now = Utc::now();
        let extras = EventExtras::default();
        let extras_json = serde_json::to_string(&extras)?;

        let result = sqlx::query(
            r#"INSERT INTO event_records
               (ingress_log_id, monitor_tool_ip, doc_id, doc_index, status, event_type,
                event_ts, title, level, asset_unique_id, asset_type, retry_count, extras,
                created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)"#,
        )
        .bind(record.ingress_log_id)
        .bind(&record.monitor_tool_ip)
        .bind(&record.doc_id)
        .bind(&record.doc_index)
        .bind(record.status.as_str())
        .bind(record.event_type.as_str())
        .bind(record.event_ts.to_rfc3339())
        .bind(&record.title)
        .bind(&record.level)
        .bind(&record.asset_unique_id)
        .bind(&record.asset_type)
        .bind(&extras_json)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(EventRecord {
            id: result.last_insert_rowid(),
            ingress_log_id: record.ingress_log_id,
            monitor_tool_ip: record.monitor_tool_ip.clone(),
            doc_id: record.doc_id.clone(),
            doc_index: record.doc_index.clone(),
            status: record.status,
            event_type: record.event_type,
            event_ts: record.event_ts,
            title: record.title.clone(),
            level: record.level.clone(),
            asset_unique_id: record.asset_unique_id.clone(),
            asset_type: record.asset_type.clone(),
            retry_count: 0,
            extras,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, id: i64) -> DomainResult<Option<EventRecord>> {
        let row: Option<EventRecordRow> =
            sqlx::query_as("SELECT * FROM event_records WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(EventRecord::try_from).transpose()
    }

    async fn update(&self, record: &EventRecord) -> DomainResult<()> {
        let extras_json = serde_json::to_string(&record.extras)?;
        sqlx::query(
            r#"UPDATE event_records
               SET status = ?, retry_count = ?, extras = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(record.status.as_str())
        .bind(i64::from(record.retry_count))
        .bind(&extras_json)
        .bind(Utc::now().to_rfc3339())
        .bind(record.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim(&self, id: i64, holder: &str, until: DateTime<Utc>) -> DomainResult<ClaimOutcome> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"UPDATE event_records
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
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM event_records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(if exists.is_some() { ClaimOutcome::Contended } else { ClaimOutcome::Missing })
    }

    async fn release(&self, id: i64, holder: &str) -> DomainResult<()> {
        sqlx::query(
            "UPDATE event_records SET locked_by = NULL, locked_until = NULL
             WHERE id = ? AND locked_by = ?",
        )
        .bind(id)
        .bind(holder)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_alerted_down_by_ticket(&self, ticket_id: i64) -> DomainResult<Vec<EventRecord>> {
        let rows: Vec<EventRecordRow> = sqlx::query_as(
            r#"SELECT * FROM event_records
               WHERE status = ? AND event_type = ?
                 AND json_extract(extras, '$.ticket_id') = ?"#,
        )
        .bind(EventStatus::Alerted.as_str())
        .bind(EventType::Down.as_str())
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EventRecord::try_from).collect()
    }

    async fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let statuses: Vec<&str> = COMPLETE_EVENT_STATUS.iter().map(|s| s.as_str()).collect();
        let result = sqlx::query(
            "DELETE FROM event_records WHERE created_at < ? AND status IN (?, ?, ?)",
        )
        .bind(cutoff.to_rfc3339())
        .bind(statuses[0])
        .bind(statuses[1])
        .bind(statuses[2])
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
