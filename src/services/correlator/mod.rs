//! The correlation state machine.
//!
//! One handler per transition source. Handlers run under the dispatcher's
//! row-exclusive claim, write the stored document first (the cluster-wide
//! decision), then mirror onto the relational record. Every soft failure is
//! reported through the error accumulator and retried by the follow-on; a
//! handler returns `Err` only for fatal escalation.

pub mod alerted;
pub mod creating_ticket;
pub mod ingest;
pub mod manual_resolve;
pub mod new_down;
pub mod new_up;
pub mod resolving;
pub mod suppressed;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::domain::errors::DomainResult;
use crate::domain::models::event::field;
use crate::domain::models::{
    EventDoc, EventRecord, EventStatus, EventType, ResolvingAction, ACTIVE_EVENT_STATUS,
    EVENT_INDEX_PATTERN,
};
use crate::domain::ports::{
    SearchQuery, SearchRequest, StoredDocument, TaskKind, TicketResult,
};
use crate::services::context::CorrelatorContext;

/// Run the handler for an event-record task. The record has been hydrated
/// and precondition-checked by the dispatcher.
pub async fn run_event_handler(
    kind: TaskKind,
    ctx: &CorrelatorContext,
    record: &mut EventRecord,
) -> DomainResult<()> {
    match kind {
        TaskKind::NewUpEvent => new_up::run(ctx, record).await,
        TaskKind::NewDownEvent => new_down::run(ctx, record).await,
        TaskKind::SuppressedEvent => suppressed::run(ctx, record).await,
        TaskKind::CreatingTicketEvent => creating_ticket::run(ctx, record).await,
        TaskKind::AlertedEvent => alerted::run(ctx, record).await,
        TaskKind::ResolvingEvent => resolving::run(ctx, record).await,
        TaskKind::IngestEvent | TaskKind::ResolveEvent => unreachable!("ingress task"),
    }
}

/// Fetch the record's stored document; reports and returns `None` when it
/// cannot be read.
pub(crate) async fn load_doc(
    ctx: &CorrelatorContext,
    record: &mut EventRecord,
    task: TaskKind,
) -> DomainResult<Option<(StoredDocument, EventDoc)>> {
    match ctx.store.get(&record.doc_index, &record.doc_id).await {
        Ok(Some(stored)) => {
            let doc = stored.event()?;
            Ok(Some((stored, doc)))
        }
        Ok(None) => {
            ctx.errors
                .report(record, &format!("Stored Event Does not Exist [Task: {task}]"))
                .await?;
            error!(doc_id = %record.doc_id, %task, "stored event does not exist");
            Ok(None)
        }
        Err(e) => {
            ctx.errors
                .report(record, &format!("Failed to Read Stored Event [Task: {task}]. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, %task, reason = %e, "failed to read stored event");
            Ok(None)
        }
    }
}

pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339()
}

/// Add the active-status `should` clauses used by dedup / parent / up-link
/// lookups.
pub(crate) fn with_active_statuses(query: SearchQuery) -> SearchQuery {
    ACTIVE_EVENT_STATUS
        .iter()
        .fold(query, |q, s| q.should_term(field::EVENT_STATUS, s.as_str()))
        .minimum_should_match(1)
}

/// Search for the immediate children of an event: down events whose parent
/// link names it and which are still suppressed or resolving.
pub(crate) fn child_search(doc_id: &str) -> SearchRequest {
    let query = SearchQuery::new()
        .must_term(field::EVENT_TYPE, EventType::Down.as_str())
        .must_term(field::PARENT_EVENT, doc_id)
        .should_term(field::EVENT_STATUS, EventStatus::Suppressed.as_str())
        .should_term(field::EVENT_STATUS, EventStatus::Resolving.as_str())
        .minimum_should_match(1);
    SearchRequest::new(EVENT_INDEX_PATTERN, query).exclude_field(field::EVENT_DETAILS)
}

/// Open a session, post one follow-up comment, close the session.
pub(crate) async fn post_ticket_comment(
    ctx: &CorrelatorContext,
    ticket_id: i64,
    comment: &str,
) -> TicketResult<()> {
    let session = ctx.tickets.open_session().await?;
    ctx.tickets.add_comment(&session, ticket_id, comment).await?;
    ctx.tickets.close_session(&session).await
}

/// Open a session, post the closing comment, solve the ticket, close the
/// session.
pub(crate) async fn comment_and_close_ticket(
    ctx: &CorrelatorContext,
    ticket_id: i64,
    comment: &str,
) -> TicketResult<()> {
    let session = ctx.tickets.open_session().await?;
    ctx.tickets.add_comment(&session, ticket_id, comment).await?;
    ctx.tickets.close_ticket(&session, ticket_id).await?;
    ctx.tickets.close_session(&session).await
}

/// Ticket propagation for suppressed and resolving (supp / close_ticket)
/// events: inherit the parent's ticket id, make it visible on the stored
/// document, then post the child down/up comments that are still missing.
///
/// Mutates `record.extras`; the caller persists the record.
pub(crate) async fn itsm_activity(
    ctx: &CorrelatorContext,
    record: &mut EventRecord,
    doc: &EventDoc,
) -> DomainResult<()> {
    if record.extras.ticket_id.is_none() {
        // First get the ticket id from the parent. Not reachable for
        // close_ticket, which only enters here with a ticket of its own.
        let (Some(parent_id), Some(parent_index)) =
            (doc.parent_event(), doc.parent_event_index.as_deref())
        else {
            ctx.errors
                .report(record, "Parent Event Does not Exist.")
                .await?;
            error!(doc_id = %record.doc_id, "parent event link missing");
            return Ok(());
        };
        debug!(doc_id = %record.doc_id, parent_id, "getting ticket id from parent event");

        let parent = match ctx.store.get(parent_index, parent_id).await {
            Ok(Some(parent)) => parent,
            Ok(None) => {
                ctx.errors
                    .report(record, &format!("Parent Event [{parent_id}] Does not Exist."))
                    .await?;
                error!(doc_id = %record.doc_id, parent_id, "parent event does not exist");
                return Ok(());
            }
            Err(e) => {
                ctx.errors
                    .report(record, &format!("Failed to Read Parent Event [{parent_id}]. Reason: {e}"))
                    .await?;
                return Ok(());
            }
        };

        let Some(parent_ticket) = parent.event()?.itsm_ticket else {
            debug!(doc_id = %record.doc_id, parent_id, "parent event does not have a ticket yet");
            return Ok(());
        };
        record.extras.ticket_id = Some(parent_ticket);
        debug!(doc_id = %record.doc_id, ticket_id = parent_ticket, "got ticket id");
    }

    let ticket_id = record.extras.ticket_id.unwrap_or(0);

    if doc.itsm_ticket.is_none() {
        // Make the ticket id visible on the stored document so this event's
        // own children can fetch it.
        let update = json!({
            field::ITSM_TICKET: ticket_id,
            field::LAST_UPDATE_TS: now_ts(),
        });
        if let Err(e) = ctx.store.update(&record.doc_index, &record.doc_id, &update).await {
            ctx.errors
                .report(record, &format!("Failed to Update Ticket ID in Store. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, reason = %e, "failed to update ticket id");
            return Ok(());
        }
        debug!(doc_id = %record.doc_id, ticket_id, "updated ticket id on stored event");
    }

    if ticket_id == 0 {
        // Do-not-create sentinel: there is no ticket to comment on.
        record.extras.asset_down_comment = true;
        if record.status == EventStatus::Resolving {
            record.extras.asset_up_comment = true;
        }
        debug!(doc_id = %record.doc_id, "do-not-create-ticket flag is set");
        return Ok(());
    }

    let asset = record.asset_unique_id.clone().unwrap_or_default();
    let mut comment: Option<String> = None;

    if !record.extras.asset_down_comment {
        // Whether suppressed or resolving, the down comment comes first.
        // This is always a child asset; the topmost asset's down comment is
        // the ticket itself.
        comment = Some(format!(
            "Child Asset `{asset}` has reported similar issue at {}.",
            record.event_ts
        ));
    }

    if record.status == EventStatus::Resolving && !record.extras.asset_up_comment {
        if doc.resolving_action == Some(ResolvingAction::CloseTicket) {
            comment = Some(format!(
                "Asset `{asset}` which reported this issue is now Resolved."
            ));
        } else if !record.extras.asset_down_comment {
            comment = comment.map(|c| format!("{c} but it is now Resolved."));
        } else {
            comment = Some(format!(
                "Child Asset `{asset}` which had reported similar issue is now Resolved."
            ));
        }
    }

    if let Some(comment) = comment {
        debug!(doc_id = %record.doc_id, ticket_id, "adding comment to ticket");
        if let Err(e) = post_ticket_comment(ctx, ticket_id, &comment).await {
            ctx.errors
                .report(record, &format!("Failed to Add comment to Ticket [{ticket_id}]. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, ticket_id, reason = %e, "failed to add ticket comment");
            return Ok(());
        }
        record.extras.asset_down_comment = true;
        if record.status == EventStatus::Resolving {
            record.extras.asset_up_comment = true;
        }
        debug!(doc_id = %record.doc_id, ticket_id, "added comment to ticket");
    }

    Ok(())
}

/// Whether every immediate child has left the suppressed/resolving states.
pub(crate) async fn all_immediate_children_resolved(
    ctx: &CorrelatorContext,
    record: &mut EventRecord,
) -> DomainResult<bool> {
    let request = child_search(&record.doc_id).size(1);
    match ctx.store.search(request).await {
        Ok(response) => {
            if response.into_first().is_some() {
                debug!(doc_id = %record.doc_id, "active child event present");
                Ok(false)
            } else {
                Ok(true)
            }
        }
        Err(e) => {
            ctx.errors
                .report(record, &format!("Failed to Search Child Events. Reason: {e}"))
                .await?;
            Ok(false)
        }
    }
}

/// Force every immediate suppressed/resolving child to manual resolution.
/// Returns `true` once no child needed a write or all writes succeeded.
pub(crate) async fn resolve_children_manually(
    ctx: &CorrelatorContext,
    record: &mut EventRecord,
    manual_resolve_ts: Option<DateTime<Utc>>,
) -> DomainResult<bool> {
    let children = match ctx.store.search(child_search(&record.doc_id)).await {
        Ok(response) => response.into_hits(),
        Err(e) => {
            ctx.errors
                .report(record, &format!("Failed to Search Child Events. Reason: {e}"))
                .await?;
            return Ok(false);
        }
    };

    let mut all_done = true;
    for child in children {
        if child.event()?.resolving_action == Some(ResolvingAction::Manual) {
            continue;
        }
        debug!(doc_id = %record.doc_id, child_id = %child.id, "setting resolving action to manual");
        let update = json!({
            field::RESOLVING_ACTION: ResolvingAction::Manual.as_str(),
            field::LAST_UPDATE_TS: now_ts(),
            field::MANUAL_RESOLVE_TS: manual_resolve_ts.map(|ts| ts.to_rfc3339()),
        });
        if let Err(e) = ctx.store.update(&child.index, &child.id, &update).await {
            ctx.errors
                .report(record, &format!("Failed to Set Resolving Action to MANUAL. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, child_id = %child.id, reason = %e,
                   "failed to set resolving action to manual");
            all_done = false;
        }
    }
    Ok(all_done)
}

/// Move every immediate active child back towards `new`: suppressed
/// children get the `supp_to_new` flag, resolving children get action `new`.
pub(crate) async fn set_active_children_to_new(
    ctx: &CorrelatorContext,
    record: &mut EventRecord,
) -> DomainResult<bool> {
    let children = match ctx.store.search(child_search(&record.doc_id)).await {
        Ok(response) => response.into_hits(),
        Err(e) => {
            ctx.errors
                .report(record, &format!("Failed to Search Child Events. Reason: {e}"))
                .await?;
            return Ok(false);
        }
    };

    let mut all_done = true;
    for child in children {
        let child_doc = child.event()?;
        let update: Option<(Value, &str)> = match child_doc.status {
            Some(EventStatus::Suppressed) => Some((
                json!({ field::SUPP_TO_NEW: true, field::LAST_UPDATE_TS: now_ts() }),
                "Failed to Initiate move to New status",
            )),
            Some(EventStatus::Resolving) => Some((
                json!({
                    field::RESOLVING_ACTION: ResolvingAction::New.as_str(),
                    field::LAST_UPDATE_TS: now_ts(),
                }),
                "Failed to Set Resolving Action to NEW",
            )),
            _ => None,
        };
        let Some((update, failure)) = update else { continue };

        debug!(doc_id = %record.doc_id, child_id = %child.id, "moving child event towards new");
        if let Err(e) = ctx.store.update(&child.index, &child.id, &update).await {
            ctx.errors
                .report(record, &format!("{failure}. Reason: {e}"))
                .await?;
            error!(doc_id = %record.doc_id, child_id = %child.id, reason = %e,
                   "failed to move child event towards new");
            all_done = false;
        }
    }
    Ok(all_done)
}
