//! Creating-ticket handler: raise the ITSM ticket (or honor the
//! do-not-create rule) and move to alerted.

use serde_json::json;
use tracing::{debug, error, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::event::field;
use crate::domain::models::{EventRecord, EventStatus, ResolvingAction};
use crate::domain::ports::ticket_client::{external_severity, NewTicket};
use crate::domain::ports::TaskKind;
use crate::services::context::CorrelatorContext;
use crate::services::templates;

use super::{load_doc, now_ts};

/// Document path of the pass-through custom ticket field.
const CUSTOM_FIELD_PATH: &str = "itsm_settings.my.custom.field";

pub async fn run(ctx: &CorrelatorContext, record: &mut EventRecord) -> DomainResult<()> {
    let Some((stored, doc)) = load_doc(ctx, record, TaskKind::CreatingTicketEvent).await? else {
        return Ok(());
    };

    // An up event arrived before the ticket was raised: skip it entirely.
    if doc.linked_event().is_some() {
        debug!(doc_id = %record.doc_id, "moving linked down event to resolving");
        let update = json!({
            field::EVENT_STATUS: EventStatus::Resolving.as_str(),
            field::RESOLVING_ACTION: ResolvingAction::New.as_str(),
            field::LAST_UPDATE_TS: now_ts(),
        });
        if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
            ctx.errors
                .report(record, &format!("Failed to Move Linked Down Event to Resolving [Task: CreatingTicketEvent]. Reason: {e}"))
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

    let rule = ctx.rules.effective_for(record).await?;

    if let Some(ticket_id) = record.extras.ticket_id {
        // Idempotent resume after a crash between creation and the status
        // write below.
        debug!(doc_id = %record.doc_id, ticket_id, "already created ticket");
    } else if rule.do_not_create_ticket {
        debug!(doc_id = %record.doc_id, "do not create ticket");
        record.extras.ticket_id = Some(0);
        record.extras.asset_down_comment = true;
    } else {
        debug!(doc_id = %record.doc_id, "creating ticket");
        let title = match rule.itsm_title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(template) => templates::render(template, &stored.source),
            None => doc.event_title.clone().unwrap_or_default(),
        };
        let description = match rule.itsm_desc.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(template) => templates::render(template, &stored.source),
            None => doc.event_desc.clone().unwrap_or_default(),
        };
        let ticket = NewTicket {
            title,
            description,
            assigned_group_uid: rule.itsm_assignment_group_uid,
            severity: Some(external_severity(rule.itsm_severity.unwrap_or(4))),
            custom_field: templates::nested_field_value(&stored.source, CUSTOM_FIELD_PATH),
        };

        let created = async {
            let session = ctx.tickets.open_session().await?;
            let ticket_id = ctx.tickets.create_ticket(&session, &ticket).await?;
            ctx.tickets.close_session(&session).await?;
            Ok::<i64, crate::domain::ports::TicketError>(ticket_id)
        }
        .await;

        match created {
            Ok(ticket_id) => {
                record.extras.ticket_id = Some(ticket_id);
                record.extras.asset_down_comment = true;
                debug!(doc_id = %record.doc_id, ticket_id, "created ticket");
            }
            Err(e) => {
                ctx.errors
                    .report(record, &format!("Failed to Create Ticket [Task: CreatingTicketEvent]. Reason: {e}"))
                    .await?;
                error!(doc_id = %record.doc_id, reason = %e, "failed to create ticket");
                return Ok(());
            }
        }
    }

    // Publish the ticket id and move to alerted.
    let update = json!({
        field::ITSM_TICKET: record.extras.ticket_id,
        field::EVENT_STATUS: EventStatus::Alerted.as_str(),
        field::LAST_UPDATE_TS: now_ts(),
    });
    if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
        ctx.errors
            .report(record, &format!("Failed to Move Down Event to Alerted [Task: CreatingTicketEvent]. Reason: {e}"))
            .await?;
        error!(doc_id = %record.doc_id, reason = %e, "failed to move down event to alerted");
        return Ok(());
    }
    record.status = EventStatus::Alerted;
    record.retry_count = 0;
    ctx.records.update(record).await?;
    debug!(doc_id = %record.doc_id, "moved down event to alerted");

    Ok(())
}
