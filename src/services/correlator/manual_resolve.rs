//! Manual resolve handler: plant a manual resolving action on the event
//! whose ticket an operator closed by hand.

use serde_json::json;
use tracing::{debug, error, info};

use crate::domain::errors::DomainResult;
use crate::domain::models::event::field;
use crate::domain::models::{IngressLog, IngressStatus, ResolvingAction};
use crate::services::context::CorrelatorContext;

use super::now_ts;

/// Find the unique alerted down event carrying the ticket id named in the
/// payload and plant `resolving_action = manual` on its stored document.
///
/// The event record is deliberately not claimed here: a concurrent alerted
/// pass may run this cycle, but it reads the stored document, so the flag
/// wins on its next pass.
pub async fn run(ctx: &CorrelatorContext, log: &mut IngressLog) -> DomainResult<()> {
    let Some(ticket_id) = log.task_data.get(field::ITSM_TICKET).and_then(|v| v.as_i64()) else {
        log.status = IngressStatus::Failed;
        log.failure_reason = format!("Missing {}", field::ITSM_TICKET);
        ctx.ingress.set_status(log.id, log.status, &log.failure_reason).await?;
        return Ok(());
    };

    debug!(ingress_log_id = log.id, ticket_id, "finding alerted event with ticket");
    let matches = ctx.records.find_alerted_down_by_ticket(ticket_id).await?;
    let record = match matches.as_slice() {
        [record] => record,
        [] => {
            error!(ingress_log_id = log.id, ticket_id, "failed to find alerted event with ticket");
            log.status = IngressStatus::Failed;
            log.failure_reason = format!("No Alerted Event with ITSM [{ticket_id}]");
            ctx.ingress.set_status(log.id, log.status, &log.failure_reason).await?;
            return Ok(());
        }
        _ => {
            error!(ingress_log_id = log.id, ticket_id, "found multiple alerted events with ticket");
            log.status = IngressStatus::Failed;
            log.failure_reason = format!("Multiple Alerted Events with ITSM [{ticket_id}]");
            ctx.ingress.set_status(log.id, log.status, &log.failure_reason).await?;
            return Ok(());
        }
    };
    debug!(ingress_log_id = log.id, record_id = record.id, ticket_id, "found alerted event");

    // The event row is not locked, so the record cannot be written; the
    // stored document is the only channel to the alerted handler.
    let update = json!({
        field::RESOLVING_ACTION: ResolvingAction::Manual.as_str(),
        field::LAST_UPDATE_TS: now_ts(),
        field::MANUAL_RESOLVE_TS: log.created_at.to_rfc3339(),
    });
    if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
        error!(ingress_log_id = log.id, record_id = record.id, ticket_id, reason = %e,
               "failed to manually resolve alerted event");
        log.status = IngressStatus::Failed;
        log.failure_reason = e.to_string();
        ctx.ingress.set_status(log.id, log.status, &log.failure_reason).await?;
        return Ok(());
    }

    log.status = IngressStatus::Completed;
    ctx.ingress.set_status(log.id, log.status, "").await?;
    info!(ingress_log_id = log.id, record_id = record.id, ticket_id,
          "manually resolved alerted event");
    Ok(())
}
