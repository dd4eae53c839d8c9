//! Resolving handler: dispose the children per the resolving action, do the
//! remaining ticket work, then mark the event resolved.

use serde_json::json;
use tracing::{debug, error, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::event::field;
use crate::domain::models::{EventRecord, EventStatus, ResolvingAction};
use crate::domain::ports::TaskKind;
use crate::services::context::CorrelatorContext;

use super::{
    all_immediate_children_resolved, comment_and_close_ticket, itsm_activity, load_doc, now_ts,
    resolve_children_manually, set_active_children_to_new,
};

pub async fn run(ctx: &CorrelatorContext, record: &mut EventRecord) -> DomainResult<()> {
    let Some((_, doc)) = load_doc(ctx, record, TaskKind::ResolvingEvent).await? else {
        return Ok(());
    };

    let action = doc.resolving_action;

    if matches!(action, Some(ResolvingAction::CloseTicket | ResolvingAction::Supp)) {
        itsm_activity(ctx, record, &doc).await?;
        if !record.extras.asset_up_comment {
            debug!(doc_id = %record.doc_id, "ticket activity is not complete, retry down event");
            record.retry_count += 1;
            ctx.records.update(record).await?;
            return Ok(());
        }

        if !all_immediate_children_resolved(ctx, record).await? {
            debug!(doc_id = %record.doc_id, "not all child events are resolved, retry down event");
            record.retry_count += 1;
            ctx.records.update(record).await?;
            return Ok(());
        }
    }

    if action == Some(ResolvingAction::New) {
        if !set_active_children_to_new(ctx, record).await? {
            info!(doc_id = %record.doc_id, "not all child events are properly processed, retry down event");
            record.retry_count += 1;
            ctx.records.update(record).await?;
            return Ok(());
        }
    }

    if action == Some(ResolvingAction::Manual) {
        // Ticket activity is skipped for manual resolution.
        if !resolve_children_manually(ctx, record, doc.manual_resolve_ts).await? {
            debug!(doc_id = %record.doc_id, "not all child events are manually resolved, retry down event");
            record.retry_count += 1;
            ctx.records.update(record).await?;
            return Ok(());
        }
    }

    if action == Some(ResolvingAction::CloseTicket) {
        if let Some(ticket_id) = doc.itsm_ticket.filter(|&t| t > 0) {
            debug!(doc_id = %record.doc_id, ticket_id, "closing ticket");
            let comment = "All assets that report this issue have now Resolved. Closing the Ticket.";
            if let Err(e) = comment_and_close_ticket(ctx, ticket_id, comment).await {
                ctx.errors
                    .report(record, &format!("Failed to Close Ticket [{ticket_id}]. Reason: {e}"))
                    .await?;
                error!(doc_id = %record.doc_id, ticket_id, reason = %e, "failed to close ticket");
                record.retry_count += 1;
                ctx.records.update(record).await?;
                return Ok(());
            }
            info!(doc_id = %record.doc_id, ticket_id, "closed ticket");
        }
    }

    let update = json!({
        field::EVENT_STATUS: EventStatus::Resolved.as_str(),
        field::LAST_UPDATE_TS: now_ts(),
    });
    if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
        ctx.errors
            .report(record, &format!("Failed to Resolve Event [Task: ResolvingEvent]. Reason: {e}"))
            .await?;
        error!(doc_id = %record.doc_id, reason = %e, "failed to resolve event");
        return Ok(());
    }
    record.status = EventStatus::Resolved;
    ctx.records.update(record).await?;
    info!(doc_id = %record.doc_id, "resolved event");

    Ok(())
}
