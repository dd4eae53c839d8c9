//! Suppressed handler: un-suppression, manual escape, up-link detection,
//! and ticket comment propagation while parked under a parent.

use serde_json::json;
use tracing::{debug, error, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::event::field;
use crate::domain::models::{EventRecord, EventStatus, ResolvingAction};
use crate::domain::ports::TaskKind;
use crate::services::context::CorrelatorContext;

use super::{itsm_activity, load_doc, now_ts};

pub async fn run(ctx: &CorrelatorContext, record: &mut EventRecord) -> DomainResult<()> {
    let Some((_, doc)) = load_doc(ctx, record, TaskKind::SuppressedEvent).await? else {
        return Ok(());
    };

    // A resolving parent sent this event back to new.
    if doc.supp_to_new.unwrap_or(false) {
        debug!(doc_id = %record.doc_id, "moving suppressed event to new status");
        let update = json!({
            field::EVENT_STATUS: EventStatus::New.as_str(),
            field::SUPP_TO_NEW: false,
            field::PARENT_EVENT: null,
            field::PARENT_EVENT_INDEX: null,
            field::LAST_UPDATE_TS: now_ts(),
        });
        if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
            ctx.errors
                .report(record, &format!("Failed to Move Suppressed Event to New status. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, reason = %e, "failed to move suppressed event to new status");
            return Ok(());
        }
        record.status = EventStatus::New;
        record.retry_count = 0;
        ctx.records.update(record).await?;
        debug!(doc_id = %record.doc_id, "moved suppressed event to new status");
        return Ok(());
    }

    // Manual resolve planted on the stored document wins.
    if doc.resolving_action == Some(ResolvingAction::Manual) {
        debug!(doc_id = %record.doc_id, "moving down event to manually resolving");
        let update = json!({
            field::EVENT_STATUS: EventStatus::Resolving.as_str(),
            field::LAST_UPDATE_TS: now_ts(),
        });
        if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
            ctx.errors
                .report(record, &format!("Failed to Move Down Event to Manually Resolving [Task: SuppressedEvent]. Reason: {e}"))
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

    // Linked to an up: resolve once the ticket comments and children settle.
    if doc.linked_event().is_some() {
        debug!(doc_id = %record.doc_id, "moving linked down event to resolving");
        let update = json!({
            field::EVENT_STATUS: EventStatus::Resolving.as_str(),
            field::RESOLVING_ACTION: ResolvingAction::Supp.as_str(),
            field::LAST_UPDATE_TS: now_ts(),
        });
        if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
            ctx.errors
                .report(record, &format!("Failed to Move Linked Down Event to Resolving [Task: SuppressedEvent]. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, reason = %e, "failed to move linked down event to resolving");
            return Ok(());
        }
        record.status = EventStatus::Resolving;
        record.retry_count = 0;
        ctx.records.update(record).await?;
        info!(doc_id = %record.doc_id, "moved linked down event to resolving");
        return Ok(());
    }

    // Still parked: keep the ticket bookkeeping moving and poll again.
    itsm_activity(ctx, record, &doc).await?;

    debug!(doc_id = %record.doc_id, "retry down event");
    record.retry_count += 1;
    ctx.records.update(record).await?;
    Ok(())
}
