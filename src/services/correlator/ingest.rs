//! Ingest handler: materialize an ingress log into a stored event document
//! and its relational record.

use serde_json::json;
use tracing::{debug, error, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::event::field;
use crate::domain::models::{
    EventRecord, EventStatus, EventType, IngressLog, IngressStatus, NewEventRecord,
};
use crate::services::context::CorrelatorContext;

/// Index the payload through the main ingest pipeline, read back the
/// enriched document, and create the mirroring event record.
///
/// Returns the created record so the dispatcher can schedule its first
/// follow-on. On store failure the ingress log goes to `failed` and no
/// record is created.
pub async fn run(
    ctx: &CorrelatorContext,
    log: &mut IngressLog,
) -> DomainResult<Option<EventRecord>> {
    let tool = ctx.rule_repo.tool_for_ip(&log.remote_ip).await?;
    let tool_name = tool.map(|t| t.name);

    let document = json!({
        field::EVENT_DETAILS: log.task_data,
        field::TOOL_IP: log.remote_ip,
        field::TOOL_NAME: tool_name,
        field::METHOD: log.method.as_str(),
        field::RECEIVED_TS: log.created_at.to_rfc3339(),
    });

    let (Some(event_id), Some(event_index)) =
        (log.event_id(&ctx.settings.environment), log.event_index())
    else {
        log.status = IngressStatus::Failed;
        log.failure_reason = "Not an event task".to_string();
        ctx.ingress.set_status(log.id, log.status, &log.failure_reason).await?;
        return Ok(None);
    };

    debug!(ingress_log_id = log.id, %event_id, %event_index, "ingesting event");
    if let Err(e) = ctx
        .store
        .index(&event_index, &event_id, Some(&ctx.settings.main_pipeline), &document, true)
        .await
    {
        error!(ingress_log_id = log.id, %event_id, reason = %e, "failed to ingest event");
        log.status = IngressStatus::Failed;
        log.failure_reason = e.to_string();
        ctx.ingress.set_status(log.id, log.status, &log.failure_reason).await?;
        return Ok(None);
    }
    info!(ingress_log_id = log.id, %event_id, %event_index, "ingested event");

    // Read back what the pipeline actually stored; status/type decisions
    // (required-field checks, defaults) happen there.
    let stored = match ctx.store.get(&event_index, &event_id).await {
        Ok(Some(stored)) => stored,
        Ok(None) => {
            log.status = IngressStatus::Failed;
            log.failure_reason = "Indexed event not readable".to_string();
            ctx.ingress.set_status(log.id, log.status, &log.failure_reason).await?;
            return Ok(None);
        }
        Err(e) => {
            log.status = IngressStatus::Failed;
            log.failure_reason = e.to_string();
            ctx.ingress.set_status(log.id, log.status, &log.failure_reason).await?;
            return Ok(None);
        }
    };
    let doc = stored.event()?;

    let monitor_tool_ip = log
        .method
        .is_valid_event_method()
        .then(|| log.remote_ip.clone());
    let record = ctx
        .records
        .create(&NewEventRecord {
            ingress_log_id: log.id,
            monitor_tool_ip,
            doc_id: event_id.clone(),
            doc_index: event_index.clone(),
            status: doc.status.unwrap_or(EventStatus::Error),
            event_type: doc.event_type.unwrap_or(EventType::Missing),
            event_ts: doc.event_ts.unwrap_or(log.created_at),
            title: doc.event_title,
            level: doc.event_level,
            asset_unique_id: doc.asset_unique_id,
            asset_type: doc.asset_type,
        })
        .await?;

    log.status = IngressStatus::Completed;
    ctx.ingress.set_status(log.id, log.status, "").await?;
    debug!(ingress_log_id = log.id, %event_id, record_id = record.id, "event record saved");

    Ok(Some(record))
}
