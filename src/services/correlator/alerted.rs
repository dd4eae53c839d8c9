//! Alerted handler: poll for the up event or a planted manual resolve.

use serde_json::json;
use tracing::{debug, error, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::event::field;
use crate::domain::models::{EventRecord, EventStatus, ResolvingAction};
use crate::domain::ports::TaskKind;
use crate::services::context::CorrelatorContext;

use super::{load_doc, now_ts};

pub async fn run(ctx: &CorrelatorContext, record: &mut EventRecord) -> DomainResult<()> {
    let Some((_, doc)) = load_doc(ctx, record, TaskKind::AlertedEvent).await? else {
        return Ok(());
    };

    // Manual resolve planted by the resolve ingress path.
    if doc.resolving_action == Some(ResolvingAction::Manual) {
        debug!(doc_id = %record.doc_id, "moving down event to manually resolving");
        let update = json!({
            field::EVENT_STATUS: EventStatus::Resolving.as_str(),
            field::LAST_UPDATE_TS: now_ts(),
        });
        if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
            ctx.errors
                .report(record, &format!("Failed to Move Down Event to Manually Resolving [Task: AlertedEvent]. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, reason = %e, "failed to move down event to manually resolving");
            return Ok(());
        }
        record.status = EventStatus::Resolving;
        record.retry_count = 0;
        ctx.records.update(record).await?;
        info!(doc_id = %record.doc_id, "moved down event to manually resolving");
        return Ok(());
    }

    // The up event arrived: this is the topmost ticketed event, so its
    // resolution closes the ticket.
    if doc.linked_event().is_some() {
        debug!(doc_id = %record.doc_id, "moving linked down event to resolving (close ticket)");
        let update = json!({
            field::EVENT_STATUS: EventStatus::Resolving.as_str(),
            field::RESOLVING_ACTION: ResolvingAction::CloseTicket.as_str(),
            field::LAST_UPDATE_TS: now_ts(),
        });
        if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
            ctx.errors
                .report(record, &format!("Failed to Move Linked Down Event to Resolving [Close Ticket] [Task: AlertedEvent]. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, reason = %e,
                   "failed to move linked down event to resolving (close ticket)");
            return Ok(());
        }
        record.status = EventStatus::Resolving;
        record.retry_count = 0;
        ctx.records.update(record).await?;
        info!(doc_id = %record.doc_id, "moved linked down event to resolving (close ticket)");
        return Ok(());
    }

    debug!(doc_id = %record.doc_id, "retry down event");
    record.retry_count += 1;
    ctx.records.update(record).await?;
    Ok(())
}
